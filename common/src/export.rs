//! Exportación de los registros de un job a disco (xlsx, csv o json).

use std::{
    fmt,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::Local;
use indexmap::IndexSet;
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ExportError;
use crate::job::{Job, Record};

pub const SHEET_NAME: &str = "크롤링 결과";
const HEADER_COLOR: u32 = 0x366092;
const MAX_COLUMN_WIDTH: usize = 50;
/// Tope de caracteres por celda que acepta Excel.
pub const MAX_CELL_CHARS: usize = 32_767;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Unión de los campos de todos los registros, en orden de primera aparición.
pub fn columns(records: &[Record]) -> Vec<String> {
    let mut seen: IndexSet<&str> = IndexSet::new();
    for rec in records {
        for key in rec.keys() {
            seen.insert(key.as_str());
        }
    }
    seen.into_iter().map(str::to_string).collect()
}

/// Escribe los registros en `path`. Falla si no hay registros.
pub fn export_records(
    records: &[Record],
    format: ExportFormat,
    path: &Path,
) -> Result<ExportSummary, ExportError> {
    if records.is_empty() {
        return Err(ExportError::Empty);
    }

    let columns = columns(records);
    match format {
        ExportFormat::Xlsx => write_xlsx(records, &columns, path)?,
        ExportFormat::Csv => write_csv(records, &columns, path)?,
        ExportFormat::Json => write_json(records, path)?,
    }

    Ok(ExportSummary {
        path: path.to_path_buf(),
        format,
        rows: records.len(),
        columns,
    })
}

/// Exporta jobs terminados dentro de un directorio de descargas.
#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn export_job(&self, job: &Job, format: ExportFormat) -> Result<ExportSummary, ExportError> {
        if !job.status.is_terminal() {
            return Err(ExportError::NotFinished {
                id: job.id.clone(),
                status: job.status,
            });
        }
        if job.records.is_empty() {
            return Err(ExportError::Empty);
        }

        fs::create_dir_all(&self.dir).map_err(|source| ExportError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(file_name(&job.name, &job.id, format));
        let summary = export_records(&job.records, format, &path)?;

        info!(
            "job {} exportado a {} ({} filas, {} columnas)",
            job.id,
            summary.path.display(),
            summary.rows,
            summary.columns.len()
        );
        Ok(summary)
    }
}

/// `<nombre>_<YYYYmmdd_HHMMSS>_<job_id>.<ext>`, todo reducido a ASCII seguro
/// para usarlo también en `Content-Disposition`. El id evita que dos jobs con
/// el mismo nombre exportados en el mismo segundo pisen el mismo archivo.
pub fn file_name(job_name: &str, job_id: &str, format: ExportFormat) -> String {
    let base = ascii_slug(job_name);
    let base = if base.is_empty() { "crawl".to_string() } else { base };
    let id = ascii_slug(job_id);

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    if id.is_empty() {
        format!("{}_{}.{}", base, ts, format.extension())
    } else {
        format!("{}_{}_{}.{}", base, ts, id, format.extension())
    }
}

fn ascii_slug(raw: &str) -> String {
    let mut out = String::new();
    for c in raw.trim().chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches(|c| c == '_' || c == '.').to_string()
}

/// Corta el valor al tope de Excel; el resto se pierde sólo en el xlsx.
fn fit_cell<'a>(value: &'a str, column: &str, row: usize) -> &'a str {
    match value.char_indices().nth(MAX_CELL_CHARS) {
        None => value,
        Some((cut, _)) => {
            warn!(
                "celda {} fila {} recortada a {} caracteres para xlsx",
                column, row, MAX_CELL_CHARS
            );
            &value[..cut]
        }
    }
}

fn write_xlsx(records: &[Record], columns: &[String], path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_COLOR))
        .set_align(FormatAlign::Center);

    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, name, &header)?;
    }

    for (row, rec) in records.iter().enumerate() {
        for (col, name) in columns.iter().enumerate() {
            if let Some(value) = rec.get(name) {
                let value = fit_cell(value, name, row + 1);
                sheet.write_string(row as u32 + 1, col as u16, value)?;
            }
        }
    }

    // ancho = texto más largo de la columna + 2, con tope
    for (col, name) in columns.iter().enumerate() {
        let longest = records
            .iter()
            .filter_map(|r| r.get(name))
            .map(|v| v.chars().count())
            .chain(std::iter::once(name.chars().count()))
            .max()
            .unwrap_or(0);
        let width = (longest + 2).min(MAX_COLUMN_WIDTH);
        sheet.set_column_width(col as u16, width as f64)?;
    }

    workbook.save(path)?;
    Ok(())
}

fn write_csv(records: &[Record], columns: &[String], path: &Path) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).map_err(io_err)?;
    // BOM para que Excel abra el UTF-8 (coreano) bien
    file.write_all("\u{feff}".as_bytes()).map_err(io_err)?;

    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    writer.write_record(columns)?;
    for rec in records {
        writer.write_record(
            columns
                .iter()
                .map(|c| rec.get(c).map(String::as_str).unwrap_or("")),
        )?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}

fn write_json(records: &[Record], path: &Path) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRequest, JobStatus};
    use calamine::{open_workbook, Reader, Xlsx};
    use std::env;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("export_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn rec(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut wb: Xlsx<_> = open_workbook(path).unwrap();
        let range = wb.worksheet_range(SHEET_NAME).unwrap();
        range
            .rows()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn finished_job(records: Vec<Record>) -> Job {
        let mut job = Job::new(
            "j1".into(),
            JobRequest {
                name: Some("뉴스 수집 test".into()),
                url: None,
                urls: vec!["http://x/1".into(); records.len()],
                selectors: None,
                follow_links: false,
            },
        );
        job.start().unwrap();
        for r in records {
            job.push_record(r).unwrap();
        }
        job.finish().unwrap();
        job
    }

    #[test]
    fn columnas_en_orden_de_primera_aparicion() {
        let records = vec![
            rec(&[("title", "a"), ("date", "d")]),
            rec(&[("title", "b"), ("image", "i"), ("content", "c")]),
            rec(&[("author", "x"), ("date", "e")]),
        ];
        assert_eq!(
            columns(&records),
            vec!["title", "date", "image", "content", "author"]
        );
    }

    #[test]
    fn xlsx_header_igual_a_union_de_claves() {
        let dir = temp_dir("xlsx_header");
        let path = dir.join("out.xlsx");
        let records = vec![
            rec(&[("title", "첫 번째"), ("date", "2024-01-01")]),
            rec(&[("title", "두 번째"), ("image", "/a.png")]),
        ];

        let summary = export_records(&records, ExportFormat::Xlsx, &path).unwrap();
        assert_eq!(summary.rows, 2);

        let rows = read_rows(&path);
        assert_eq!(rows[0], vec!["title", "date", "image"]);
        assert_eq!(rows[1], vec!["첫 번째", "2024-01-01", ""]);
        assert_eq!(rows[2], vec!["두 번째", "", "/a.png"]);
    }

    #[test]
    fn csv_con_bom_y_celdas_vacias() {
        let dir = temp_dir("csv");
        let path = dir.join("out.csv");
        let records = vec![rec(&[("a", "1")]), rec(&[("b", "한글")])];

        export_records(&records, ExportFormat::Csv, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with('\u{feff}'));
        let lines: Vec<&str> = content.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines, vec!["a,b", "1,", ",한글"]);
    }

    #[test]
    fn json_conserva_registros_tal_cual() {
        let dir = temp_dir("json");
        let path = dir.join("out.json");
        let records = vec![rec(&[("title", "T")]), rec(&[])];

        export_records(&records, ExportFormat::Json, &path).unwrap();

        let back: Vec<Record> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn sin_registros_es_error() {
        let dir = temp_dir("empty");
        let res = export_records(&[], ExportFormat::Xlsx, &dir.join("x.xlsx"));
        assert!(matches!(res, Err(ExportError::Empty)));
    }

    #[test]
    fn destino_no_escribible_es_error() {
        let dir = temp_dir("unwritable");
        let path = dir.join("no").join("existe").join("out.xlsx");
        let records = vec![rec(&[("a", "1")])];

        assert!(export_records(&records, ExportFormat::Xlsx, &path).is_err());
        assert!(matches!(
            export_records(&records, ExportFormat::Csv, &path),
            Err(ExportError::Io { .. })
        ));
    }

    #[test]
    fn exporter_crea_directorio_y_nombre_ascii() {
        let dir = temp_dir("exporter").join("downloads");
        let exporter = Exporter::new(&dir);
        let job = finished_job(vec![rec(&[("title", "t")])]);

        let summary = exporter.export_job(&job, ExportFormat::Xlsx).unwrap();

        assert!(summary.path.exists());
        assert!(summary.path.starts_with(&dir));
        let name = summary.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("test_"), "nombre inesperado: {name}");
        assert!(name.ends_with(".xlsx"));
        assert!(name.is_ascii());
    }

    #[test]
    fn exporter_rechaza_jobs_sin_terminar_o_vacios() {
        let dir = temp_dir("exporter_rechaza");
        let exporter = Exporter::new(&dir);

        let pending = Job::new(
            "p".into(),
            JobRequest {
                name: None,
                url: Some("http://x/1".into()),
                urls: vec![],
                selectors: None,
                follow_links: false,
            },
        );
        assert!(matches!(
            exporter.export_job(&pending, ExportFormat::Csv),
            Err(ExportError::NotFinished {
                status: JobStatus::Pending,
                ..
            })
        ));

        let empty = finished_job(vec![]);
        assert!(matches!(
            exporter.export_job(&empty, ExportFormat::Xlsx),
            Err(ExportError::Empty)
        ));
    }

    #[test]
    fn format_desde_texto() {
        assert_eq!("XLSX".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(ExportError::UnknownFormat(_))
        ));
    }

    #[test]
    fn file_name_sanitiza() {
        let name = file_name("  my job / 2024 ", "abc-123", ExportFormat::Csv);
        assert!(name.starts_with("my_job_2024_"), "{name}");
        assert!(name.ends_with("_abc-123.csv"), "{name}");

        let only_korean = file_name("한국어", "j1", ExportFormat::Json);
        assert!(only_korean.starts_with("crawl_"), "{only_korean}");
    }

    #[test]
    fn celdas_largas_se_recortan_en_xlsx() {
        let dir = temp_dir("xlsx_largo");
        let path = dir.join("out.xlsx");
        let long = "가".repeat(40_000);
        let records = vec![rec(&[("content", long.as_str()), ("title", "corto")])];

        let summary = export_records(&records, ExportFormat::Xlsx, &path).unwrap();
        assert_eq!(summary.rows, 1);

        let rows = read_rows(&path);
        assert_eq!(rows[0], vec!["content", "title"]);
        assert_eq!(rows[1][0].chars().count(), MAX_CELL_CHARS);
        assert_eq!(rows[1][1], "corto");
    }

    #[test]
    fn celdas_largas_quedan_completas_en_csv_y_json() {
        let dir = temp_dir("csv_largo");
        let long = "a".repeat(40_000);
        let records = vec![rec(&[("content", long.as_str())])];

        let csv_path = dir.join("out.csv");
        export_records(&records, ExportFormat::Csv, &csv_path).unwrap();
        assert!(fs::read_to_string(&csv_path).unwrap().contains(&long));

        let json_path = dir.join("out.json");
        export_records(&records, ExportFormat::Json, &json_path).unwrap();
        let back: Vec<Record> =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(back[0]["content"].len(), 40_000);
    }

    #[test]
    fn jobs_con_el_mismo_nombre_no_comparten_archivo() {
        let dir = temp_dir("mismo_nombre");
        let exporter = Exporter::new(&dir);

        let mut a = finished_job(vec![rec(&[("title", "AAA")])]);
        a.id = "job-a".into();
        a.name = "crawl_example.com".into();
        let mut b = finished_job(vec![rec(&[("title", "BBB")])]);
        b.id = "job-b".into();
        b.name = "crawl_example.com".into();

        let sa = exporter.export_job(&a, ExportFormat::Json).unwrap();
        let sb = exporter.export_job(&b, ExportFormat::Json).unwrap();
        assert_ne!(sa.path, sb.path);

        let back_a: Vec<Record> =
            serde_json::from_str(&fs::read_to_string(&sa.path).unwrap()).unwrap();
        assert_eq!(back_a[0]["title"], "AAA");
        let back_b: Vec<Record> =
            serde_json::from_str(&fs::read_to_string(&sb.path).unwrap()).unwrap();
        assert_eq!(back_b[0]["title"], "BBB");
    }
}
