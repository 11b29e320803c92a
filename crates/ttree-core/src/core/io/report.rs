use crate::core::models::template::SrcLoc;
use std::io::{self, Write};

pub const REPORT_FILE_NAME: &str = "ttree_assignments.txt";

/// One resolved variable as listed in the binding report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRecord {
    pub name: String,
    pub value: String,
    /// Position in the order bindings were first created.
    pub order: usize,
    /// Where the variable was first referenced.
    pub loc: SrcLoc,
}

/// Writes one `name value order` line per record. Names containing whitespace are
/// quoted so the columns stay machine-readable.
pub fn write_binding_report<W: Write>(records: &[BindingRecord], writer: &mut W) -> io::Result<()> {
    for record in records {
        if record.name.chars().any(char::is_whitespace) {
            writeln!(writer, "\"{}\" {} {}", record.name, record.value, record.order)?;
        } else {
            writeln!(writer, "{} {} {}", record.name, record.value, record.order)?;
        }
    }
    writer.flush()
}
