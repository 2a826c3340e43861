use std::io::Cursor;
use std::path::Path;

use calamine::{Data, ExcelDateTime, Range, Reader, SheetType, open_workbook_auto_from_rs};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::constants::{ALLOWED_UPLOAD_EXTENSIONS, CSV_SHEET_NAME};
use crate::error::BatchError;

/// Worksheets of an uploaded file in workbook order, plus the one a batch
/// reads identifiers from and writes results into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    sheets: Vec<(String, Sheet)>,
    target: usize,
}

impl Book {
    /// Decodes an uploaded `.xlsx`, `.xls` or `.csv` file.
    ///
    /// Every worksheet of a workbook is kept. The target is the workbook's
    /// active sheet; for files that don't record one it is the first sheet with
    /// identifiers in column A, or else the first sheet.
    pub fn from_upload(file_name: &str, bytes: &[u8]) -> Result<Self, BatchError> {
        let Some(ext) = upload_extension(file_name) else {
            return Err(BatchError::BadFileType);
        };
        match ext.as_str() {
            "csv" => Ok(Self::single(CSV_SHEET_NAME, Sheet::from_csv(bytes)?)),
            _ => Self::from_workbook(bytes),
        }
    }

    pub fn single(name: impl Into<String>, sheet: Sheet) -> Self {
        Self {
            sheets: vec![(name.into(), sheet)],
            target: 0,
        }
    }

    fn from_workbook(bytes: &[u8]) -> Result<Self, BatchError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(input_err)?;
        // `activeTab` counts every sheet, chart sheets included.
        let active = xlsx_active_tab(bytes)
            .and_then(|tab| workbook.sheets_metadata().get(tab))
            .map(|meta| meta.name.clone());
        let names: Vec<String> = workbook
            .sheets_metadata()
            .iter()
            .filter(|meta| meta.typ == SheetType::WorkSheet)
            .map(|meta| meta.name.clone())
            .collect();

        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let range = workbook.worksheet_range(&name).map_err(input_err)?;
            sheets.push((name, Sheet::from_range(&range)));
        }
        if sheets.is_empty() {
            return Err(BatchError::Input("workbook has no worksheets".to_string()));
        }

        let target = active
            .and_then(|name| sheets.iter().position(|(n, _)| *n == name))
            .or_else(|| {
                sheets
                    .iter()
                    .position(|(_, sheet)| !sheet.identifier_rows().is_empty())
            })
            .unwrap_or(0);
        Ok(Self { sheets, target })
    }

    pub fn target(&self) -> &Sheet {
        &self.sheets[self.target].1
    }

    pub fn target_mut(&mut self) -> &mut Sheet {
        &mut self.sheets[self.target].1
    }

    pub fn target_name(&self) -> &str {
        &self.sheets[self.target].0
    }

    /// Encodes every worksheet under its original name. The target sheet is
    /// active and gets a bold header row.
    pub fn to_xlsx(&self) -> Result<Vec<u8>, BatchError> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();

        for (idx, (name, sheet)) in self.sheets.iter().enumerate() {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(name.as_str()).map_err(output_err)?;
            if idx == self.target {
                worksheet.set_active(true);
                sheet.write_to(worksheet, Some(&header))?;
            } else {
                sheet.write_to(worksheet, None)?;
            }
        }

        workbook.save_to_buffer().map_err(output_err)
    }
}

#[cfg(test)]
impl Book {
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, sheet)| sheet)
    }
}

/// In-memory worksheet of display strings.
///
/// Positions are 1-based, like the row and column numbers a spreadsheet shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
}

impl Sheet {
    fn from_csv(bytes: &[u8]) -> Result<Self, BatchError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|e| BatchError::Input(e.to_string()))?;
            rows.push(
                record
                    .iter()
                    .map(|field| String::from_utf8_lossy(field).into_owned())
                    .collect(),
            );
        }
        Ok(Self { rows })
    }

    fn from_range(range: &Range<Data>) -> Self {
        let mut sheet = Self::default();
        // The used range may not start at A1.
        let Some((first_row, first_col)) = range.start() else {
            return sheet;
        };
        for (r, row) in range.rows().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let value = cell_text(cell);
                if !value.is_empty() {
                    sheet.set(
                        first_row as usize + r + 1,
                        first_col as usize + c + 1,
                        value,
                    );
                }
            }
        }
        sheet
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn set(&mut self, row: usize, col: usize, value: impl Into<String>) {
        debug_assert!(row > 0 && col > 0, "sheet positions are 1-based");
        let (r, c) = (row.saturating_sub(1), col.saturating_sub(1));
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize_with(c + 1, String::new);
        }
        cells[c] = value.into();
    }

    /// `(row, identifier)` pairs from column A below the header row, skipping
    /// blank cells.
    pub fn identifier_rows(&self) -> Vec<(usize, String)> {
        self.rows
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(idx, cells)| {
                let value = cells.first().map(|v| v.trim()).unwrap_or("");
                // A literal "None" is an empty cell that went through a script.
                (!value.is_empty() && value != "None").then(|| (idx + 1, value.to_string()))
            })
            .collect()
    }

    fn write_to(
        &self,
        worksheet: &mut Worksheet,
        header: Option<&Format>,
    ) -> Result<(), BatchError> {
        for (r, cells) in self.rows.iter().enumerate() {
            let row = u32::try_from(r).map_err(|_| too_large("rows"))?;
            for (c, value) in cells.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let col = u16::try_from(c).map_err(|_| too_large("columns"))?;
                let written = match header {
                    Some(format) if row == 0 => {
                        worksheet.write_string_with_format(row, col, value, format)
                    }
                    _ => worksheet.write_string(row, col, value),
                };
                written.map_err(output_err)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl Sheet {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn get(&self, row: usize, col: usize) -> &str {
        if row == 0 || col == 0 {
            return "";
        }
        self.rows
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Lower-cased extension of `file_name` when it is an accepted upload type.
pub fn upload_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|x| x.to_str())
        .map(str::to_ascii_lowercase)?;
    ALLOWED_UPLOAD_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

/// Index of the active sheet recorded in an `.xlsx` package. A workbook view
/// without `activeTab` means the first sheet. `None` for anything that is not
/// an `.xlsx` package.
fn xlsx_active_tab(bytes: &[u8]) -> Option<usize> {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
    let mut xml = String::new();
    archive
        .by_name("xl/workbook.xml")
        .ok()?
        .read_to_string(&mut xml)
        .ok()?;

    let Some(start) = xml.find("<workbookView") else {
        return Some(0);
    };
    let view = &xml[start..];
    let view = &view[..view.find('>').unwrap_or(view.len())];
    match view.split("activeTab=\"").nth(1) {
        Some(rest) => rest[..rest.find('"')?].parse().ok(),
        None => Some(0),
    }
}

fn input_err(e: calamine::Error) -> BatchError {
    BatchError::Input(e.to_string())
}

fn output_err(e: XlsxError) -> BatchError {
    BatchError::Output(e.to_string())
}

fn too_large(what: &str) -> BatchError {
    BatchError::Output(format!("sheet has too many {what} for an .xlsx worksheet"))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        // Identifiers typed into Excel arrive as floats.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => datetime_text(dt),
        Data::Error(e) => e.to_string(),
    }
}

/// ISO date, with the time of day only when it is not midnight.
fn datetime_text(dt: &ExcelDateTime) -> String {
    match dt.as_datetime().filter(|_| dt.is_datetime()) {
        Some(value) => {
            let text = value.format("%Y-%m-%d %H:%M:%S").to_string();
            match text.strip_suffix(" 00:00:00") {
                Some(date) => date.to_string(),
                None => text,
            }
        }
        None => dt.as_f64().to_string(),
    }
}
