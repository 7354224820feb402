//! Printable report of the currently displayed receptions.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::query::total_units_displayed;
use crate::{ReceptionError, ReceptionRecord};

pub const REPORT_TITLE: &str = "Reception Report";

pub const REPORT_COLUMNS: [&str; 9] = [
    "Product",
    "Pallet",
    "Cartons",
    "Units/Carton",
    "Total Units",
    "Barcode",
    "Production",
    "Expiration",
    "Status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Fixed-width text table
    #[default]
    Plaintext,
    /// Standalone page, printable to PDF from any browser
    Html,
    Json,
}

impl ReportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Plaintext => "txt",
            Self::Html => "html",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportRow {
    pub product_name: String,
    pub pallet_number: String,
    pub cartons: String,
    pub units_per_carton: String,
    pub total_units: String,
    pub barcode: String,
    pub production_date: String,
    pub expiration_date: String,
    pub status: String,
}

impl ReportRow {
    fn from_record(record: &ReceptionRecord) -> Self {
        Self {
            product_name: record.product_name.clone(),
            pallet_number: record.pallet_number.clone().unwrap_or_else(|| "-".to_string()),
            cartons: record.cartons.to_string(),
            units_per_carton: record.units_per_carton.to_string(),
            total_units: group_thousands(u128::from(record.total_units)),
            barcode: record.barcode.clone(),
            production_date: day_month_year(record.production_date),
            expiration_date: day_month_year(record.expiration_date),
            status: record.status.label().to_string(),
        }
    }

    fn cells(&self) -> [&str; 9] {
        [
            &self.product_name,
            &self.pallet_number,
            &self.cartons,
            &self.units_per_carton,
            &self.total_units,
            &self.barcode,
            &self.production_date,
            &self.expiration_date,
            &self.status,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceptionReport {
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub record_count: usize,
    pub total_units: u128,
    pub columns: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl ReceptionReport {
    /// Build the report over exactly the rows currently displayed.
    ///
    /// # Errors
    /// Returns [`ReceptionError::Validation`] when there is nothing to export.
    pub fn build(
        rows: &[ReceptionRecord],
        generated_at: OffsetDateTime,
    ) -> Result<Self, ReceptionError> {
        if rows.is_empty() {
            return Err(ReceptionError::Validation(
                "no receptions to export for the current filters".to_string(),
            ));
        }

        Ok(Self {
            title: REPORT_TITLE.to_string(),
            generated_at,
            record_count: rows.len(),
            total_units: total_units_displayed(rows),
            columns: REPORT_COLUMNS.iter().map(ToString::to_string).collect(),
            rows: rows.iter().map(ReportRow::from_record).collect(),
        })
    }

    #[must_use]
    pub fn generated_on(&self) -> String {
        format!(
            "{} at {:02}:{:02}",
            day_month_year(self.generated_at.date()),
            self.generated_at.hour(),
            self.generated_at.minute()
        )
    }

    /// # Errors
    /// Returns [`ReceptionError::Query`] when JSON serialization fails.
    pub fn render(&self, format: ReportFormat) -> Result<String, ReceptionError> {
        match format {
            ReportFormat::Plaintext => Ok(self.render_plaintext()),
            ReportFormat::Html => Ok(self.render_html()),
            ReportFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|err| ReceptionError::Query(format!("failed to serialize report: {err}"))),
        }
    }

    fn render_plaintext(&self) -> String {
        let mut widths = REPORT_COLUMNS.map(str::len);
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row.cells()) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut output = String::new();
        let _ = writeln!(output, "{}", self.title);
        let _ = writeln!(output, "Generated on {}", self.generated_on());
        let _ = writeln!(output);
        let _ = writeln!(output, "Receptions: {}", self.record_count);
        let _ = writeln!(output, "Total units: {}", group_thousands(self.total_units));
        let _ = writeln!(output);
        push_text_line(&mut output, &REPORT_COLUMNS, &widths);
        let rule = widths.iter().map(|width| "-".repeat(*width)).collect::<Vec<_>>().join("-+-");
        let _ = writeln!(output, "{rule}");
        for row in &self.rows {
            push_text_line(&mut output, &row.cells(), &widths);
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "Grand total: {} total units", group_thousands(self.total_units));
        output
    }

    fn render_html(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "<!DOCTYPE html>");
        let _ = writeln!(output, "<html><head><meta charset=\"utf-8\">");
        let _ = writeln!(output, "<title>{}</title>", html_escape(&self.title));
        let _ = writeln!(
            output,
            "<style>body{{font-family:sans-serif;font-size:10pt}}\
             table{{border-collapse:collapse;width:100%}}\
             th{{background:#2980b9;color:#fff}}\
             th,td{{border:1px solid #999;padding:2px 4px}}\
             tr:nth-child(even) td{{background:#f5f5f5}}</style>"
        );
        let _ = writeln!(output, "</head><body>");
        let _ = writeln!(output, "<h1>{}</h1>", html_escape(&self.title));
        let _ = writeln!(output, "<p>Generated on {}</p>", self.generated_on());
        let _ = writeln!(output, "<p>Receptions: {}</p>", self.record_count);
        let _ = writeln!(output, "<p>Total units: {}</p>", group_thousands(self.total_units));
        let _ = writeln!(output, "<table><thead><tr>");
        for column in &self.columns {
            let _ = writeln!(output, "<th>{}</th>", html_escape(column));
        }
        let _ = writeln!(output, "</tr></thead><tbody>");
        for row in &self.rows {
            output.push_str("<tr>");
            for cell in row.cells() {
                let _ = write!(output, "<td>{}</td>", html_escape(cell));
            }
            output.push_str("</tr>\n");
        }
        let _ = writeln!(output, "</tbody></table>");
        let _ = writeln!(
            output,
            "<p><strong>Grand total: {} total units</strong></p>",
            group_thousands(self.total_units)
        );
        let _ = writeln!(output, "</body></html>");
        output
    }
}

/// `rapport-receptions-dd-MM-yyyy-HHmm.<ext>`
#[must_use]
pub fn report_file_name(generated_at: OffsetDateTime, format: ReportFormat) -> String {
    format!(
        "rapport-receptions-{:02}-{:02}-{:04}-{:02}{:02}.{}",
        generated_at.day(),
        u8::from(generated_at.month()),
        generated_at.year(),
        generated_at.hour(),
        generated_at.minute(),
        format.extension()
    )
}

fn day_month_year(date: Date) -> String {
    format!("{:02}/{:02}/{:04}", date.day(), u8::from(date.month()), date.year())
}

fn group_thousands(value: u128) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

fn push_text_line(output: &mut String, cells: &[&str], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}", width = *width))
        .collect::<Vec<_>>()
        .join(" | ");
    let _ = writeln!(output, "{}", line.trim_end());
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
