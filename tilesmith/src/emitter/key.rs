use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::KeyParseError;
use crate::{
    DataType,
    descriptor::{
        Architecture, ConvDescription, ConvKind, EpilogueFunctor, EpilogueParameters, GemmMode, IteratorAlgorithm,
        Layout, MathInstruction, MathOperation, OpcodeClass, OperationDescriptor, OperationKind, StrideSupport,
        SwizzlingFunctor, TensorDescription, TileDescription, TileShape,
    },
};

const SECTION_COUNT: usize = 9;

/// Canonical textual name of a kernel specialization. Equal descriptors produce equal
/// keys, and every field that changes the compiled kernel appears in the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecializationKey(String);

impl SpecializationKey {
    pub fn from_descriptor(descriptor: &OperationDescriptor) -> Self {
        let sections = [
            kind_section(&descriptor.kind),
            descriptor.architecture.to_string(),
            instruction_section(descriptor.math_instruction()),
            tensor_section(&descriptor.a),
            tensor_section(&descriptor.b),
            tensor_section(&descriptor.c),
            tile_section(&descriptor.tile),
            epilogue_section(&descriptor.epilogue),
            descriptor.swizzle.token().to_string(),
        ];
        Self(sections.join("_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reconstructs the descriptor this key was emitted from.
    pub fn parse(&self) -> Result<OperationDescriptor, KeyParseError> {
        parse_key(&self.0)
    }
}

impl fmt::Display for SpecializationKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SpecializationKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let descriptor = parse_key(s)?;
        Ok(Self::from_descriptor(&descriptor))
    }
}

impl OperationDescriptor {
    pub fn specialization_key(&self) -> SpecializationKey {
        SpecializationKey::from_descriptor(self)
    }

    pub fn from_key(key: &str) -> Result<Self, KeyParseError> {
        parse_key(key)
    }
}

fn kind_section(kind: &OperationKind) -> String {
    match kind {
        OperationKind::Gemm {
            mode,
        } => format!("gemm-{}", mode.token()),
        OperationKind::Conv2d(conv) => format!(
            "conv2d-{}-{}-{}",
            conv.conv_kind.token(),
            conv.iterator_algorithm.token(),
            conv.stride_support.token()
        ),
    }
}

fn instruction_section(instruction: &MathInstruction) -> String {
    format!(
        "{}-{}-{}-{}-{}-{}",
        instruction.opcode_class.token(),
        instruction.instruction_shape,
        instruction.element_a,
        instruction.element_b,
        instruction.element_accumulator,
        instruction.math_operation.token()
    )
}

fn tensor_section(tensor: &TensorDescription) -> String {
    format!("{}-{}-a{}", tensor.element, tensor.layout.token(), tensor.alignment)
}

fn tile_section(tile: &TileDescription) -> String {
    let cluster = match tile.cluster_shape {
        Some(shape) => format!("c{shape}"),
        None => "cnone".to_string(),
    };
    let persistent = if tile.persistent {
        "p"
    } else {
        "np"
    };
    format!("tb{}-w{}-s{}-{}-{}", tile.threadblock_shape, tile.warp_count, tile.stages, cluster, persistent)
}

fn epilogue_section(epilogue: &EpilogueFunctor) -> String {
    let parameters = epilogue.parameters();
    format!(
        "{}-{}-a{}-{}-{}",
        epilogue.token(),
        parameters.element_output,
        parameters.alignment,
        parameters.element_accumulator,
        parameters.element_compute
    )
}

/// Field cursor over one `-`-separated key section.
struct Section<'a> {
    key: &'a str,
    section: &'a str,
    fields: std::str::Split<'a, char>,
}

impl<'a> Section<'a> {
    fn new(
        key: &'a str,
        section: &'a str,
    ) -> Self {
        Self {
            key,
            section,
            fields: section.split('-'),
        }
    }

    fn error(
        &self,
        reason: impl Into<String>,
    ) -> KeyParseError {
        KeyParseError::Malformed {
            key: self.key.to_string(),
            section: self.section.to_string(),
            reason: reason.into(),
        }
    }

    fn next(&mut self) -> Result<&'a str, KeyParseError> {
        self.fields.next().ok_or_else(|| self.error("missing field"))
    }

    fn token<T>(
        &mut self,
        what: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, KeyParseError> {
        let field = self.next()?;
        parse(field).ok_or_else(|| self.error(format!("unknown {what} `{field}`")))
    }

    fn data_type(&mut self) -> Result<DataType, KeyParseError> {
        self.token("data type", |field| field.parse().ok())
    }

    fn shape(
        &mut self,
        prefix: &str,
    ) -> Result<TileShape, KeyParseError> {
        self.token("shape", |field| field.strip_prefix(prefix)?.parse().ok())
    }

    fn number(
        &mut self,
        prefix: &str,
    ) -> Result<u32, KeyParseError> {
        self.token("number", |field| field.strip_prefix(prefix)?.parse().ok())
    }

    fn finish(mut self) -> Result<(), KeyParseError> {
        match self.fields.next() {
            Some(extra) => Err(self.error(format!("unexpected field `{extra}`"))),
            None => Ok(()),
        }
    }
}

fn parse_kind(mut section: Section<'_>) -> Result<OperationKind, KeyParseError> {
    let kind = match section.next()? {
        "gemm" => OperationKind::Gemm {
            mode: section.token("gemm mode", GemmMode::from_token)?,
        },
        "conv2d" => OperationKind::Conv2d(ConvDescription {
            conv_kind: section.token("conv kind", ConvKind::from_token)?,
            iterator_algorithm: section.token("iterator algorithm", IteratorAlgorithm::from_token)?,
            stride_support: section.token("stride support", StrideSupport::from_token)?,
        }),
        other => return Err(section.error(format!("unknown operation `{other}`"))),
    };
    section.finish()?;
    Ok(kind)
}

fn parse_instruction(mut section: Section<'_>) -> Result<MathInstruction, KeyParseError> {
    let opcode_class = section.token("opcode class", OpcodeClass::from_token)?;
    let instruction_shape = section.shape("")?;
    let element_a = section.data_type()?;
    let element_b = section.data_type()?;
    let element_accumulator = section.data_type()?;
    let math_operation = section.token("math operation", MathOperation::from_token)?;
    section.finish()?;
    Ok(MathInstruction::new(instruction_shape, element_a, element_b, element_accumulator, opcode_class, math_operation))
}

fn parse_tensor(mut section: Section<'_>) -> Result<TensorDescription, KeyParseError> {
    let element = section.data_type()?;
    let layout = section.token("layout", Layout::from_token)?;
    let alignment = section.number("a")?;
    section.finish()?;
    Ok(TensorDescription::new(element, layout, alignment))
}

fn parse_tile(
    mut section: Section<'_>,
    math_instruction: MathInstruction,
) -> Result<TileDescription, KeyParseError> {
    let threadblock_shape = section.shape("tb")?;
    let warp_count = section.shape("w")?;
    let stages = section.number("s")?;
    let cluster_shape = section.token("cluster", |field| match field {
        "cnone" => Some(None),
        other => other.strip_prefix('c')?.parse().ok().map(Some),
    })?;
    let persistent = section.token("persistence", |field| match field {
        "p" => Some(true),
        "np" => Some(false),
        _ => None,
    })?;
    section.finish()?;

    let mut tile = TileDescription::new(threadblock_shape, stages, warp_count, math_instruction);
    tile.cluster_shape = cluster_shape;
    tile.persistent = persistent;
    Ok(tile)
}

fn parse_epilogue(mut section: Section<'_>) -> Result<EpilogueFunctor, KeyParseError> {
    let token = section.next()?;
    let element_output = section.data_type()?;
    let alignment = section.number("a")?;
    let element_accumulator = section.data_type()?;
    let element_compute = section.data_type()?;
    let parameters = EpilogueParameters::new(element_output, alignment, element_accumulator, element_compute);
    let epilogue =
        EpilogueFunctor::from_token(token, parameters).ok_or_else(|| section.error(format!("unknown epilogue `{token}`")))?;
    section.finish()?;
    Ok(epilogue)
}

fn parse_key(key: &str) -> Result<OperationDescriptor, KeyParseError> {
    let sections: Vec<&str> = key.split('_').collect();
    let [kind, architecture, instruction, a, b, c, tile, epilogue, swizzle] = sections[..] else {
        return Err(KeyParseError::SectionCount {
            key: key.to_string(),
            found: sections.len(),
            expected: SECTION_COUNT,
        });
    };

    let kind = parse_kind(Section::new(key, kind))?;
    let architecture = {
        let mut section = Section::new(key, architecture);
        let number = section.number("sm")?;
        section.finish()?;
        Architecture(number)
    };
    let math_instruction = parse_instruction(Section::new(key, instruction))?;
    let a = parse_tensor(Section::new(key, a))?;
    let b = parse_tensor(Section::new(key, b))?;
    let c = parse_tensor(Section::new(key, c))?;
    let tile = parse_tile(Section::new(key, tile), math_instruction)?;
    let epilogue = parse_epilogue(Section::new(key, epilogue))?;
    let swizzle = Section::new(key, swizzle).token("swizzle", SwizzlingFunctor::from_token)?;

    Ok(OperationDescriptor::new(kind, architecture, tile, a, b, c, epilogue, swizzle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::LayoutCombination;

    fn f64_tensor_op_gemm(layouts: LayoutCombination) -> OperationDescriptor {
        let (layout_a, layout_b, layout_c) = layouts.layouts();
        let instruction = MathInstruction::tensor_op(TileShape::new(16, 8, 4), DataType::F64, DataType::F64);
        let tile = TileDescription::new(TileShape::new(128, 128, 32), 3, TileShape::new(2, 2, 1), instruction)
            .with_cluster_shape(TileShape::UNIT);
        OperationDescriptor::new(
            OperationKind::Gemm {
                mode: GemmMode::Universal,
            },
            Architecture::SM90,
            tile,
            TensorDescription::new(DataType::F64, layout_a, 1),
            TensorDescription::new(DataType::F64, layout_b, 1),
            TensorDescription::new(DataType::F64, layout_c, 1),
            EpilogueFunctor::LinearCombination(EpilogueParameters::new(DataType::F64, 1, DataType::F64, DataType::F64)),
            SwizzlingFunctor::Identity1,
        )
    }

    #[test]
    fn key_spells_out_every_field() {
        let key = f64_tensor_op_gemm(LayoutCombination::NNT).specialization_key();
        assert_eq!(
            key.as_str(),
            "gemm-universal_sm90_tensorop-16x8x4-f64-f64-f64-madd_f64-col-a1_f64-col-a1_f64-row-a1_tb128x128x32-w2x2x1-s3-c1x1x1-np_lincomb-f64-a1-f64-f64_identity1"
        );
    }

    #[test]
    fn key_parses_back_to_descriptor() {
        let mut descriptor = f64_tensor_op_gemm(LayoutCombination::TNN);
        descriptor.tile.cluster_shape = None;
        let key = descriptor.specialization_key();
        assert!(key.as_str().contains("-cnone-"));
        assert_eq!(OperationDescriptor::from_key(key.as_str()), Ok(descriptor));
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!(matches!(
            OperationDescriptor::from_key("gemm-universal_sm90"),
            Err(KeyParseError::SectionCount {
                found: 2,
                ..
            })
        ));
        let key = f64_tensor_op_gemm(LayoutCombination::NNN).specialization_key().to_string();
        let broken = key.replace("identity1", "diagonal");
        assert!(matches!(OperationDescriptor::from_key(&broken), Err(KeyParseError::Malformed { .. })));
    }
}
