use std::io::{self, Write};

use colored::Colorize;
use comfy_table::{Cell, Color, Table};

use crate::Quote;
use crate::bom::LineCategory;

impl Quote {
    /// Write the BOM as a formatted table to the given writer, followed by
    /// the backplane requirements, the totals and any advisory warnings.
    pub fn write_table<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(comfy_table::ContentArrangement::DynamicFullWidth);
        table.set_header(vec![
            "Slot",
            "Part Number",
            "Description",
            "Options",
            "Connectors",
            "Width",
            "Unit (proto)",
            "Unit (series)",
        ]);

        for line in &self.lines {
            // Unregistered product/option combinations ship with a pseudo
            // part number; make them stand out.
            let part_cell = if line.matched_article || line.category == LineCategory::Backplane {
                Cell::new(&line.part_number)
            } else {
                Cell::new(&line.part_number).fg(Color::Yellow)
            };

            let options = line
                .options
                .iter()
                .map(|(id, value)| format!("{id}: {value}"))
                .collect::<Vec<_>>()
                .join(", ");
            let connectors = if line.category == LineCategory::Backplane {
                "see below".to_string()
            } else {
                line.connectors.join(", ")
            };
            let width = if line.category == LineCategory::Backplane {
                "-".to_string()
            } else {
                format!("{}HP", line.width_hp)
            };

            table.add_row(vec![
                Cell::new(&line.label),
                part_cell,
                Cell::new(&line.name),
                Cell::new(options),
                Cell::new(connectors),
                Cell::new(width),
                Cell::new(line.unit_price_prototype.to_string()),
                Cell::new(line.unit_price_series.to_string()),
            ]);
        }
        writeln!(writer, "{table}")?;

        if let Some(backplane) = self
            .lines
            .iter()
            .find(|l| l.category == LineCategory::Backplane)
        {
            writeln!(writer, "\nBackplane configuration:")?;
            let mut bp_table = Table::new();
            bp_table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
            bp_table.set_header(vec!["Slot", "Required connectors"]);
            for (slot, connectors) in &backplane.slot_connectors {
                bp_table.add_row(vec![slot.to_string(), connectors.join(", ")]);
            }
            writeln!(writer, "{bp_table}")?;
        }

        writeln!(
            writer,
            "\nPrototype total ({} units): {}",
            self.quantities.prototype_billed(),
            self.prototype_total
        )?;
        if self.quantities.series > 0 {
            writeln!(
                writer,
                "Series total ({} units): {}",
                self.quantities.series, self.series_total
            )?;
        }
        writeln!(writer, "Estimated total: {}", self.grand_total)?;

        if let Some(eol) = self.eol_horizon {
            writeln!(writer, "System EOL: {eol}")?;
        }
        for warning in &self.advisories {
            writeln!(writer, "{} {warning}", "warning:".yellow().bold())?;
        }
        Ok(())
    }
}
