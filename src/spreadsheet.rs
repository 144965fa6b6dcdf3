use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use log::{debug, warn};

/// 表計算ソフトの形式として読み込む拡張子。
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// 取り込みファイルを読み込み、ヘッダー行を含む2次元の表として返す。
///
/// CSVはテキストとして、Excel/ODSは最初のシートを読み込む。それ以外の拡張子はエラーとする。
///
/// # Arguments
///
/// * `path` - 読み込むファイル
pub fn read_table(path: &Path) -> Result<Vec<Vec<String>>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    let table = if extension == "csv" {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        read_csv(file).with_context(|| format!("Failed to read CSV: {}", path.display()))?
    } else if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
        read_workbook(path)
            .with_context(|| format!("Failed to read spreadsheet: {}", path.display()))?
    } else {
        bail!(
            "Unsupported file type {:?}: expected .csv, .xlsx, .xls or .ods",
            path.display().to_string()
        );
    };
    debug!("Read {} rows from {}", table.len(), path.display());

    Ok(table)
}

/// 表計算ソフトのファイルの最初のシートを読み込む。
///
/// 日付や時刻のセルはシリアル値の文字列にする。
pub fn read_workbook(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.context("Failed to read the first sheet")?,
        None => bail!("Workbook has no sheets"),
    };

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        Data::Float(value) => value.to_string(),
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(value) => value.as_f64().to_string(),
        Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
        Data::Error(error) => {
            warn!("Spreadsheet cell has an error value: {:?}", error);
            String::new()
        }
    }
}

/// CSVを読み込む。
///
/// 行ごとの列数は揃っていなくてもよい。先頭のBOMは取り除く。
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Vec<String>>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut table = Vec::new();
    for (index, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse CSV line {}", index + 1))?;
        table.push(record.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
    }
    if let Some(first) = table.first_mut().and_then(|row| row.first_mut()) {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use calamine::Data;
    use rstest::rstest;

    use super::{cell_to_string, read_csv, read_table};
    use crate::column_mapper::build_preview;

    fn testdata(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
    }

    #[test]
    fn test_read_csv() {
        let content = "\u{feff}Employee No,Date,IN\n1001,45000,0.375\n\n1002,\"Mar 16, 2023\"\n";

        let table = read_csv(content.as_bytes()).unwrap();

        assert_eq!(
            table,
            vec![
                vec!["Employee No", "Date", "IN"],
                vec!["1001", "45000", "0.375"],
                vec!["1002", "Mar 16, 2023"],
            ]
        );
    }

    #[test]
    fn test_read_table_rejects_other_extensions() {
        let result = read_table(Path::new("attendance.txt"));

        assert!(result.unwrap_err().to_string().contains("Unsupported file type"));
    }

    #[test]
    fn test_read_table_xlsx() {
        let table = read_table(&testdata("attendance.xlsx")).unwrap();

        assert_eq!(
            table,
            vec![
                vec!["Employee No", "Date", "Day", "IN", "OUT", "IN", "OUT", "Next Day", "Hours Work"],
                vec!["1001", "45000", "Wed", "0.375", "0.5", "0.5625", "0.75", "", "8"],
            ]
        );
    }

    /// Excelの日付と時刻のセルがプレビューで読める形式になる。
    #[test]
    fn test_read_table_xlsx_preview() {
        let table = read_table(&testdata("attendance.xlsx")).unwrap();

        let preview = build_preview(table, 10).unwrap();

        assert_eq!(
            preview.rows,
            vec![vec![
                "1001", "2023-03-15", "Wed", "09:00 AM", "12:00 PM", "01:30 PM", "06:00 PM", "", "8.00"
            ]]
        );
    }

    #[test]
    fn test_read_table_missing_workbook() {
        assert!(read_table(Path::new("does-not-exist.xlsx")).is_err());
    }

    #[rstest]
    #[case(Data::Empty, "")]
    #[case(Data::String("Wed".to_string()), "Wed")]
    #[case(Data::Float(45000.0), "45000")]
    #[case(Data::Float(0.375), "0.375")]
    #[case(Data::Int(1001), "1001")]
    #[case(Data::Bool(true), "true")]
    #[case(Data::DateTimeIso("2023-03-15T08:00:00".to_string()), "2023-03-15T08:00:00")]
    fn test_cell_to_string(#[case] cell: Data, #[case] expected: &str) {
        assert_eq!(cell_to_string(&cell), expected);
    }

    #[test]
    fn test_read_table_missing_file() {
        assert!(read_table(Path::new("does-not-exist.csv")).is_err());
    }
}
