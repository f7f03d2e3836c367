use std::path::Path;

use comfy_table::{ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use super::scenario_rows;

pub fn handle_list(rows_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let rows = scenario_rows(rows_path)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Row", "Problems", "Key"]);
    for row in &rows {
        table.add_row(vec![
            row.name.clone(),
            row.problem_sizes.len().to_string(),
            row.descriptor.specialization_key().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
