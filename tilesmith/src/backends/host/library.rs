use std::{
    fmt::Write,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    DataType,
    backends::common::{KernelImage, KernelTemplateLibrary, TemplateInstantiationError},
    emitter::InstantiationRequest,
};

const TEMPLATES: [&str; 5] = [
    "GemmUniversal",
    "GemmSplitKSerial",
    "ImplicitGemmConv2dFprop",
    "ImplicitGemmConv2dDgrad",
    "ImplicitGemmConv2dWgrad",
];

const OPERAND_ELEMENTS: [DataType; 6] =
    [DataType::F16, DataType::BF16, DataType::F32, DataType::F64, DataType::I8, DataType::U8];

const OUTPUT_ELEMENTS: [DataType; 7] =
    [DataType::F16, DataType::BF16, DataType::F32, DataType::F64, DataType::I8, DataType::U8, DataType::I32];

const ACCUMULATOR_ELEMENTS: [DataType; 3] = [DataType::F32, DataType::F64, DataType::I32];

const PERSISTENT_THREADBLOCK_ROWS: [u32; 2] = [64, 128];

/// Catalog of host kernel templates. Instantiation checks the request against what the
/// catalog provides and renders a listing of the template arguments as the kernel image.
#[derive(Debug, Default)]
pub struct HostTemplateLibrary {
    instantiations: AtomicUsize,
}

impl HostTemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful instantiations so far.
    pub fn instantiations(&self) -> usize {
        self.instantiations.load(Ordering::Relaxed)
    }

    fn check_element(
        parameter: &'static str,
        element: DataType,
        supported: &[DataType],
    ) -> Result<(), TemplateInstantiationError> {
        if supported.contains(&element) {
            Ok(())
        } else {
            Err(TemplateInstantiationError::UnsupportedElement {
                parameter,
                element,
            })
        }
    }

    fn render(request: &InstantiationRequest) -> String {
        let mut source = String::new();
        let _ = writeln!(source, "// {}", request.key);
        let _ = writeln!(source, "using Operation = {}<", request.template_name);
        let last = request.template_arguments.len().saturating_sub(1);
        for (index, (name, value)) in request.template_arguments.iter().enumerate() {
            let separator = if index == last {
                ""
            } else {
                ","
            };
            let _ = writeln!(source, "    /* {name} */ {value}{separator}");
        }
        let _ = writeln!(source, ">;");
        source
    }
}

impl KernelTemplateLibrary for HostTemplateLibrary {
    fn name(&self) -> &str {
        "host"
    }

    fn instantiate(
        &self,
        request: &InstantiationRequest,
    ) -> Result<KernelImage, TemplateInstantiationError> {
        if !TEMPLATES.contains(&request.template_name) {
            return Err(TemplateInstantiationError::UnknownTemplate(request.template_name.to_string()));
        }
        let descriptor = &request.descriptor;
        Self::check_element("ElementA", descriptor.a.element, &OPERAND_ELEMENTS)?;
        Self::check_element("ElementB", descriptor.b.element, &OPERAND_ELEMENTS)?;
        Self::check_element("ElementC", descriptor.c.element, &OUTPUT_ELEMENTS)?;
        Self::check_element(
            "ElementAccumulator",
            descriptor.math_instruction().element_accumulator,
            &ACCUMULATOR_ELEMENTS,
        )?;
        if request.argument("ThreadblockShape").is_none() {
            return Err(TemplateInstantiationError::MissingArgument("ThreadblockShape"));
        }

        let threadblock_rows = descriptor.tile.threadblock_shape.m;
        if descriptor.tile.persistent && !PERSISTENT_THREADBLOCK_ROWS.contains(&threadblock_rows) {
            return Err(TemplateInstantiationError::Rejected(format!(
                "persistent schedules need a threadblock M of 64 or 128, got {threadblock_rows}"
            )));
        }

        self.instantiations.fetch_add(1, Ordering::Relaxed);
        Ok(KernelImage {
            key: request.key.clone(),
            descriptor: descriptor.clone(),
            entry_point: format!("tilesmith_{}", request.key),
            source: Self::render(request),
        })
    }
}
