use serde::{Deserialize, Serialize};

use crate::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    RowMajor,
    ColumnMajor,
    TensorNhwc,
}

impl Layout {
    pub fn token(&self) -> &'static str {
        match self {
            Layout::RowMajor => "row",
            Layout::ColumnMajor => "col",
            Layout::TensorNhwc => "nhwc",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "row" => Some(Layout::RowMajor),
            "col" => Some(Layout::ColumnMajor),
            "nhwc" => Some(Layout::TensorNhwc),
            _ => None,
        }
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, Layout::RowMajor | Layout::ColumnMajor)
    }

    /// Element offset of `(row, column)` in a dense `rows x columns` matrix stored in this layout.
    pub fn matrix_offset(
        &self,
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    ) -> usize {
        match self {
            Layout::ColumnMajor => column * rows + row,
            _ => row * columns + column,
        }
    }
}

/// Layouts of A, B and C in BLAS letters: `N` is column-major, `T` is row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutCombination {
    NNN,
    NNT,
    NTN,
    NTT,
    TNN,
    TNT,
    TTN,
    TTT,
}

impl LayoutCombination {
    pub fn layouts(&self) -> (Layout, Layout, Layout) {
        let letter = |transposed: bool| {
            if transposed {
                Layout::RowMajor
            } else {
                Layout::ColumnMajor
            }
        };
        let (a, b, c) = match self {
            LayoutCombination::NNN => (false, false, false),
            LayoutCombination::NNT => (false, false, true),
            LayoutCombination::NTN => (false, true, false),
            LayoutCombination::NTT => (false, true, true),
            LayoutCombination::TNN => (true, false, false),
            LayoutCombination::TNT => (true, false, true),
            LayoutCombination::TTN => (true, true, false),
            LayoutCombination::TTT => (true, true, true),
        };
        (letter(a), letter(b), letter(c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDescription {
    pub element: DataType,
    pub layout: Layout,
    /// Vector access width, in elements.
    pub alignment: u32,
}

impl TensorDescription {
    pub fn new(
        element: DataType,
        layout: Layout,
        alignment: u32,
    ) -> Self {
        Self {
            element,
            layout,
            alignment,
        }
    }

    pub fn access_bits(&self) -> u64 {
        self.alignment as u64 * self.element.size_in_bits() as u64
    }

    pub fn alignment_in_bytes(&self) -> usize {
        ((self.access_bits() + 7) / 8).max(1) as usize
    }
}
