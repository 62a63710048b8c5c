//! Spreadsheet export of monthly grids.
//!
//! Rows are produced from the same [`MonthlyGrid`] the grid API returns and
//! copy its display strings verbatim; the workbook writer only adds layout and
//! formatting.

use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatBorder, FormatDiagonalBorder, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::Result;
use crate::model::grid::{DayClass, MonthlyGrid, YearMonth};
use crate::service::aggregation::build_many;
use crate::service::persistence::PersistenceCoordinator;
use crate::service::rules::RuleSet;

const HEADERS: [&str; 6] = ["Date", "Day", "Status", "Check-in", "Check-out", "Leave"];
const SHEET_NAME_MAX: usize = 31;

/// One exported day row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub date: String,
    pub weekday: String,
    pub class: DayClass,
    pub check_in: String,
    pub check_out: String,
    pub leave: String,
}

/// Everything written for one employee-month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetModel {
    pub title: String,
    pub employee_id: i64,
    pub employee_name: String,
    pub month: YearMonth,
    pub rows: Vec<SheetRow>,
    pub average_check_in: String,
    pub average_check_out: String,
}

impl From<&MonthlyGrid> for SheetModel {
    fn from(grid: &MonthlyGrid) -> Self {
        let rows = grid
            .cells
            .iter()
            .map(|cell| SheetRow {
                date: cell.date.format("%Y-%m-%d").to_string(),
                weekday: cell.weekday.clone(),
                class: cell.class,
                check_in: cell.display.check_in.clone(),
                check_out: cell.display.check_out.clone(),
                leave: cell.display.leave.clone(),
            })
            .collect();

        Self {
            title: sheet_title(&grid.employee_name, grid.employee_id, grid.month),
            employee_id: grid.employee_id,
            employee_name: grid.employee_name.clone(),
            month: grid.month,
            rows,
            average_check_in: grid.average_check_in_text(),
            average_check_out: grid.average_check_out_text(),
        }
    }
}

/// Worksheet names: max 31 chars, none of `[]:*?/\` and no apostrophe at
/// either end.
fn sheet_title(name: &str, employee_id: i64, month: YearMonth) -> String {
    let suffix = format!(" {month} #{employee_id}");
    let budget = SHEET_NAME_MAX.saturating_sub(suffix.chars().count());
    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect();
    let head: String = clean
        .trim_matches(|c: char| c == '\'' || c.is_whitespace())
        .chars()
        .take(budget)
        .collect();
    match head.trim_end_matches(|c: char| c == '\'' || c.is_whitespace()) {
        "" => suffix.trim_start().to_string(),
        head => format!("{head}{suffix}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ExportFailure {
    pub employee_id: i64,
    #[schema(value_type = String)]
    pub month: String,
    pub message: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct ExportReport {
    pub sheets: usize,
    pub failures: Vec<ExportFailure>,
}

/// Cell formats per day classification.
struct Styles {
    header: Format,
    plain: Format,
    weekend: Format,
    pre_employment: Format,
    half_day: Format,
    full_leave: Format,
    deleted: Format,
    label: Format,
}

impl Styles {
    fn new() -> Self {
        let base = Format::new().set_border(FormatBorder::Thin);
        Self {
            header: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0x4472C4))
                .set_font_color(Color::White)
                .set_border(FormatBorder::Thin),
            plain: base.clone(),
            weekend: base.clone().set_background_color(Color::RGB(0xD9D9D9)),
            pre_employment: base
                .clone()
                .set_border_diagonal(FormatBorder::Thin)
                .set_border_diagonal_type(FormatDiagonalBorder::BorderUpDown),
            half_day: base.clone().set_background_color(Color::RGB(0xFFF2CC)),
            full_leave: base.clone().set_background_color(Color::RGB(0xFCE4D6)),
            deleted: base.set_font_color(Color::RGB(0x808080)),
            label: Format::new().set_bold(),
        }
    }

    fn for_class(&self, class: DayClass) -> &Format {
        match class {
            DayClass::Normal => &self.plain,
            DayClass::Weekend => &self.weekend,
            DayClass::PreEmployment => &self.pre_employment,
            DayClass::HalfDayLeave => &self.half_day,
            DayClass::FullLeave => &self.full_leave,
            DayClass::Deleted => &self.deleted,
        }
    }
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &SheetModel, styles: &Styles) -> Result<(), XlsxError> {
    worksheet.set_name(&sheet.title)?;

    worksheet.write_string_with_format(0, 0, "Employee", &styles.label)?;
    worksheet.write_string(0, 1, &sheet.employee_name)?;
    worksheet.write_string_with_format(1, 0, "Month", &styles.label)?;
    worksheet.write_string(1, 1, sheet.month.to_string())?;

    let header_row = 3;
    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(header_row, col as u16, *header, &styles.header)?;
    }

    worksheet.set_column_width(0, 12)?;
    worksheet.set_column_width(1, 6)?;
    worksheet.set_column_width(2, 16)?;
    worksheet.set_column_width(3, 10)?;
    worksheet.set_column_width(4, 10)?;
    worksheet.set_column_width(5, 12)?;

    let mut row = header_row + 1;
    for day in &sheet.rows {
        let format = styles.for_class(day.class);
        let values = [
            day.date.as_str(),
            day.weekday.as_str(),
            day.class.as_str(),
            day.check_in.as_str(),
            day.check_out.as_str(),
            day.leave.as_str(),
        ];
        for (col, value) in values.iter().enumerate() {
            if value.is_empty() {
                worksheet.write_blank(row, col as u16, format)?;
            } else {
                worksheet.write_string_with_format(row, col as u16, *value, format)?;
            }
        }
        row += 1;
    }

    row += 1;
    worksheet.write_string_with_format(row, 2, "Average check-in", &styles.label)?;
    worksheet.write_string(row, 3, &sheet.average_check_in)?;
    worksheet.write_string_with_format(row + 1, 2, "Average check-out", &styles.label)?;
    worksheet.write_string(row + 1, 4, &sheet.average_check_out)?;

    worksheet.set_freeze_panes(header_row + 1, 0)?;
    Ok(())
}

fn write_failures(worksheet: &mut Worksheet, failures: &[ExportFailure], styles: &Styles) -> Result<(), XlsxError> {
    worksheet.set_name("Errors")?;
    for (col, header) in ["Employee", "Month", "Problem"].iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &styles.header)?;
    }
    worksheet.set_column_width(2, 80)?;
    for (idx, failure) in failures.iter().enumerate() {
        let row = (idx + 1) as u32;
        worksheet.write_number(row, 0, failure.employee_id as f64)?;
        worksheet.write_string(row, 1, &failure.month)?;
        worksheet.write_string(row, 2, &failure.message)?;
    }
    Ok(())
}

/// Encode sheets into a workbook.
///
/// A sheet the writer refuses becomes one more failure instead of failing the
/// workbook. Failures get their own sheet.
pub fn render_workbook(sheets: Vec<SheetModel>, mut failures: Vec<ExportFailure>) -> Result<Export, XlsxError> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();
    let mut written = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        let mut worksheet = Worksheet::new();
        match write_sheet(&mut worksheet, &sheet, &styles) {
            Ok(()) => {
                workbook.push_worksheet(worksheet);
                written.push(sheet);
            }
            Err(e) => {
                warn!(title = %sheet.title, error = %e, "Sheet skipped in export");
                failures.push(ExportFailure {
                    employee_id: sheet.employee_id,
                    month: sheet.month.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    if !failures.is_empty() || written.is_empty() {
        let mut errors = Worksheet::new();
        write_failures(&mut errors, &failures, &styles)?;
        workbook.push_worksheet(errors);
    }
    Ok(Export {
        report: ExportReport {
            sheets: written.len(),
            failures,
        },
        sheets: written,
        workbook,
    })
}

/// A finished export: the sheet contents plus the encoded workbook.
pub struct Export {
    pub sheets: Vec<SheetModel>,
    pub report: ExportReport,
    workbook: Workbook,
}

impl Export {
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        Ok(self.workbook.save_to_buffer()?)
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.workbook.save(path)?;
        info!(path = %path.display(), sheets = self.report.sheets, "Report written");
        Ok(())
    }
}

/// Re-derives every grid through the aggregation engine and renders it.
pub struct ReportExporter<'a> {
    store: &'a PersistenceCoordinator,
    rules: &'a RuleSet,
}

impl<'a> ReportExporter<'a> {
    pub fn new(store: &'a PersistenceCoordinator, rules: &'a RuleSet) -> Self {
        Self { store, rules }
    }

    /// Export `employee_ids` (all employees when empty) for `from..=to`.
    pub async fn export(&self, employee_ids: &[i64], from: YearMonth, to: YearMonth) -> Result<Export> {
        let employee_ids = if employee_ids.is_empty() {
            self.store.employee_ids().await?
        } else {
            employee_ids.to_vec()
        };
        let months = from.through(to);

        let mut sheets = Vec::new();
        let mut failures = Vec::new();
        let snapshots = self.store.load_months(&employee_ids, &months).await?;
        for (employee_id, month, grid) in build_many(snapshots, self.rules) {
            match grid {
                Ok(grid) => sheets.push(SheetModel::from(&grid)),
                Err(e) => {
                    warn!(employee_id, %month, error = %e, "Employee skipped in export");
                    failures.push(ExportFailure {
                        employee_id,
                        month: month.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let export = render_workbook(sheets, failures)?;
        info!(
            sheets = export.report.sheets,
            failures = export.report.failures.len(),
            %from,
            %to,
            "Attendance export rendered"
        );
        Ok(export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_titles_fit_excel_limits() {
        let month = YearMonth::new(2025, 9).unwrap();
        let title = sheet_title("A very long employee name that goes on [and on]", 12, month);
        assert!(title.chars().count() <= SHEET_NAME_MAX, "{title}");
        assert!(title.ends_with(" 2025-09 #12"));
        assert!(!title.contains('['));

        assert_eq!(sheet_title("Kim", 1, month), "Kim 2025-09 #1");
    }

    #[test]
    fn sheet_titles_drop_edge_apostrophes() {
        let month = YearMonth::new(2025, 9).unwrap();
        assert_eq!(sheet_title("'Lee", 2, month), "Lee 2025-09 #2");
        assert_eq!(sheet_title(" 'O'Brien' ", 3, month), "O'Brien 2025-09 #3");
        assert_eq!(sheet_title("''", 4, month), "2025-09 #4");
    }

    #[test]
    fn empty_export_still_renders() {
        let mut export = render_workbook(vec![], vec![]).unwrap();
        let bytes = export.to_bytes().unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    fn sheet(title: &str, employee_id: i64) -> SheetModel {
        SheetModel {
            title: title.into(),
            employee_id,
            employee_name: "Kim".into(),
            month: YearMonth::new(2025, 9).unwrap(),
            rows: vec![],
            average_check_in: "-".into(),
            average_check_out: "-".into(),
        }
    }

    #[test]
    fn refused_sheet_becomes_a_failure() {
        let mut export = render_workbook(vec![sheet("Kim 2025-09 #1", 1), sheet("bad[name", 2)], vec![]).unwrap();
        assert_eq!(export.report.sheets, 1);
        assert_eq!(export.sheets[0].employee_id, 1);
        assert_eq!(export.report.failures.len(), 1);
        assert_eq!(export.report.failures[0].employee_id, 2);
        assert_eq!(export.report.failures[0].month, "2025-09");
        assert_eq!(&export.to_bytes().unwrap()[..2], b"PK");
    }
}
