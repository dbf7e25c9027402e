//! CSV Export

use crate::contacts::normalize::ContactBook;
use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write the book as `Name,Phone` CSV
pub fn write_csv(book: &ContactBook, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    write_csv_to(book, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write the book as CSV to any writer
pub fn write_csv_to<W: Write>(book: &ContactBook, writer: &mut W) -> Result<()> {
    writer.write_all(b"Name,Phone\r\n")?;
    for contact in book.contacts() {
        write!(
            writer,
            "{},{}\r\n",
            escape_field(&contact.name),
            escape_field(&contact.phone)
        )?;
    }
    Ok(())
}

/// Quote a field if it contains a delimiter, quote or line break
fn escape_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}
