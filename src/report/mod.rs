//! Report generation: Markdown/JSON dashboards and CSV export.

pub mod csv_export;
pub mod generator;

pub use csv_export::write_export;
pub use generator::{
    generate_analysis_section, generate_headline_section, generate_json_report,
    generate_markdown_report, generate_records_table, DashboardReport, RenderOptions,
    ReportMetadata,
};
