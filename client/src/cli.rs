use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{
    fetch::validate_url, runner::DEFAULT_POLITENESS_DELAY, AutoDetector, DetectRequest,
    DetectResponse, ErrorResponse, ExportError, ExportFormat, Exporter, FetchConfig, HealthResponse,
    HttpFetcher, Job, JobRequest, JobRunner, JobStore, JobSummary, QuickCrawlRequest,
    SelectorMap, StatsResponse,
};
use reqwest::{Client, Response};

/// - En Docker: SERVER_URL=http://server:8080
/// - Local: default http://localhost:8080
fn server_base_url() -> String {
    env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "CLI para mandar crawls al server y bajar los resultados")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Envía un job nuevo
    Submit {
        /// URL a crawlear (se puede repetir)
        #[arg(long = "url", value_name = "URL", required = true)]
        urls: Vec<String>,

        #[command(flatten)]
        selectors: SelectorArgs,

        #[arg(long)]
        name: Option<String>,

        /// Suma los links del mismo sitio que aparezcan en la primera página
        #[arg(long)]
        follow_links: bool,
    },
    /// Crawl de una sola URL con auto-detect
    Quick {
        #[arg(value_name = "URL")]
        url: String,

        #[arg(long)]
        name: Option<String>,

        /// Suma los links del mismo sitio que aparezcan en la primera página
        #[arg(long)]
        follow_links: bool,
    },
    /// Consulta el estado de un job
    Status {
        #[arg(value_name = "JOB_ID")]
        id: String,

        /// Muestra también los logs del job
        #[arg(long)]
        logs: bool,
    },
    /// Lista los jobs del server, más nuevos primero
    List,
    /// Espera a que el job termine
    Wait {
        #[arg(value_name = "JOB_ID")]
        id: String,

        /// Segundos entre consultas
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
    /// Baja los resultados de un job terminado
    Export {
        #[arg(value_name = "JOB_ID")]
        id: String,

        /// xlsx, csv o json
        #[arg(long, default_value = "xlsx", value_parser = parse_format)]
        format: ExportFormat,

        /// Archivo de salida (default: <job_id>.<ext>)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Muestra qué selectores elegiría el auto-detect para una URL
    Detect {
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Contadores del server
    Stats,
    /// Corre un crawl local, sin server, y exporta el resultado
    Crawl {
        #[arg(long = "url", value_name = "URL", required = true)]
        urls: Vec<String>,

        #[command(flatten)]
        selectors: SelectorArgs,

        #[arg(long)]
        name: Option<String>,

        /// Suma los links del mismo sitio que aparezcan en la primera página
        #[arg(long)]
        follow_links: bool,

        #[arg(long, default_value = "xlsx", value_parser = parse_format)]
        format: ExportFormat,

        /// Directorio donde se escribe el archivo
        #[arg(long, default_value = "downloads")]
        output_dir: PathBuf,
    },
}

#[derive(clap::Args, Debug, Default)]
struct SelectorArgs {
    /// Selector en formato "campo: css" (se puede repetir)
    #[arg(long = "selector", value_name = "CAMPO: CSS")]
    lines: Vec<String>,

    /// Archivo con un "campo: css" por línea
    #[arg(long)]
    selectors_file: Option<PathBuf>,
}

impl SelectorArgs {
    /// Sin selectores devuelve `None`, o sea auto-detect.
    async fn load(&self) -> Result<Option<SelectorMap>> {
        let mut text = String::new();
        if let Some(path) = &self.selectors_file {
            text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("no se pudo leer {}", path.display()))?;
            text.push('\n');
        }
        text.push_str(&self.lines.join("\n"));
        parse_selectors(&text)
    }
}

fn parse_format(raw: &str) -> Result<ExportFormat, String> {
    raw.parse().map_err(|e: ExportError| e.to_string())
}

fn parse_selectors(text: &str) -> Result<Option<SelectorMap>> {
    let map = SelectorMap::parse_lines(text)?;
    Ok(if map.is_empty() { None } else { Some(map) })
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = server_base_url();

    match cli.command {
        Commands::Submit {
            urls,
            selectors,
            name,
            follow_links,
        } => {
            let req = JobRequest {
                name,
                url: None,
                urls,
                selectors: selectors.load().await?,
                follow_links,
            };
            let url = format!("{}/api/v1/jobs", base_url);
            let resp = check(client.post(&url).json(&req).send().await?).await?;
            let job: Job = resp.json().await?;

            println!("Job creado:");
            print_job(&job, false);
        }

        Commands::Quick {
            url,
            name,
            follow_links,
        } => {
            let req = QuickCrawlRequest {
                url,
                name,
                follow_links,
            };
            let endpoint = format!("{}/api/v1/quick-crawl", base_url);
            let resp = check(client.post(&endpoint).json(&req).send().await?).await?;
            let job: Job = resp.json().await?;

            println!("Job creado (auto-detect):");
            print_job(&job, false);
        }

        Commands::Status { id, logs } => {
            let job = fetch_job(&client, &base_url, &id).await?;
            print_job(&job, logs);
        }

        Commands::List => {
            let url = format!("{}/api/v1/jobs", base_url);
            let resp = check(client.get(&url).send().await?).await?;
            let jobs: Vec<JobSummary> = resp.json().await?;

            if jobs.is_empty() {
                println!("No hay jobs.");
            }
            for j in jobs {
                println!(
                    "{}  {:<8} {:>3}%  {:>3} registros  {}",
                    j.id,
                    format!("{:?}", j.status).to_lowercase(),
                    j.progress,
                    j.records,
                    j.name
                );
            }
        }

        Commands::Wait { id, interval } => {
            let pause = Duration::from_secs(interval.max(1));
            loop {
                let job = fetch_job(&client, &base_url, &id).await?;
                if job.status.is_terminal() {
                    print_job(&job, false);
                    break;
                }
                println!(
                    "  {:?}: {}/{} páginas ({}%)",
                    job.status,
                    job.pages_done,
                    job.urls.len(),
                    job.progress()
                );
                tokio::time::sleep(pause).await;
            }
        }

        Commands::Export { id, format, output } => {
            let url = format!("{}/api/v1/jobs/{}/export", base_url, id);
            let resp = check(
                client
                    .get(&url)
                    .query(&[("format", format.extension())])
                    .send()
                    .await?,
            )
            .await?;
            let bytes = resp.bytes().await?;

            let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.{}", id, format)));
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("no se pudo escribir {}", path.display()))?;
            println!("Exportado {} ({} bytes)", path.display(), bytes.len());
        }

        Commands::Detect { url } => {
            let endpoint = format!("{}/api/v1/detect", base_url);
            let resp = check(
                client
                    .post(&endpoint)
                    .json(&DetectRequest { url })
                    .send()
                    .await?,
            )
            .await?;
            let detected: DetectResponse = resp.json().await?;

            if detected.selectors.is_empty() {
                println!("No se detectó ningún campo en {}", detected.url);
            }
            for (field, sel) in detected.selectors.iter() {
                let value = detected.preview.get(field).map(String::as_str).unwrap_or("");
                println!("  {:<8} {:<30} {}", field, sel.selector, preview(value));
            }
        }

        Commands::Stats => {
            let health: HealthResponse = check(client.get(format!("{}/health", base_url)).send().await?)
                .await?
                .json()
                .await?;
            let url = format!("{}/api/v1/stats", base_url);
            let stats: StatsResponse = check(client.get(&url).send().await?).await?.json().await?;

            println!("Server: {}", health.status);
            println!(
                "  jobs: total={}, pending={}, running={}, done={}, failed={}",
                stats.total_jobs, stats.pending, stats.running, stats.done, stats.failed
            );
            println!("  registros: {}", stats.total_records);
        }

        Commands::Crawl {
            urls,
            selectors,
            name,
            follow_links,
            format,
            output_dir,
        } => {
            crawl_local(
                JobRequest {
                    name,
                    url: None,
                    urls,
                    selectors: selectors.load().await?,
                    follow_links,
                },
                format,
                output_dir,
            )
            .await?;
        }
    }

    Ok(())
}

/// Mismo pipeline que el server pero en proceso: store + runner + exporter.
async fn crawl_local(req: JobRequest, format: ExportFormat, output_dir: PathBuf) -> Result<()> {
    for url in req.targets() {
        validate_url(&url)?;
    }

    let store = JobStore::new();
    let fetcher = HttpFetcher::new(FetchConfig::default())?;
    let runner = JobRunner::new(
        store.clone(),
        Arc::new(fetcher),
        Arc::new(AutoDetector::default()),
        DEFAULT_POLITENESS_DELAY,
    );

    let id = store.create(req);
    runner.run(&id).await?;
    let job = store.get(&id)?;

    for line in &job.logs {
        println!("{}", line);
    }
    if let Some(err) = &job.error {
        bail!("el crawl falló: {}", err);
    }

    let summary = Exporter::new(output_dir).export_job(&job, format)?;
    println!(
        "Exportado {} ({} filas, {} columnas)",
        summary.path.display(),
        summary.rows,
        summary.columns.len()
    );
    Ok(())
}

async fn fetch_job(client: &Client, base_url: &str, id: &str) -> Result<Job> {
    let url = format!("{}/api/v1/jobs/{}", base_url, id);
    let resp = check(client.get(&url).send().await?).await?;
    Ok(resp.json().await?)
}

/// Convierte un status no-2xx en error, con el mensaje que mandó el server.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = match resp.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => "sin detalle".to_string(),
    };
    bail!("el server respondió {}: {}", status, detail)
}

fn print_job(job: &Job, with_logs: bool) {
    println!("  id: {}", job.id);
    println!("  nombre: {}", job.name);
    println!("  estado: {:?}", job.status);
    println!(
        "  progreso: {}/{} páginas ({}%)",
        job.pages_done,
        job.urls.len(),
        job.progress()
    );
    println!("  registros: {}", job.records.len());
    println!("  creado: {}", job.created_at);
    if let Some(started) = &job.started_at {
        println!("  iniciado: {}", started);
    }
    if let Some(done) = &job.completed_at {
        println!("  finalizado: {}", done);
    }
    if let Some(err) = &job.error {
        println!("  error: {}", err);
    }
    if with_logs {
        println!("  logs:");
        for line in &job.logs {
            println!("    {}", line);
        }
    }
}

fn preview(value: &str) -> String {
    const MAX: usize = 60;
    if value.chars().count() <= MAX {
        value.to_string()
    } else {
        let cut: String = value.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ExtractMode;

    #[test]
    fn submit_acepta_urls_y_selectores_repetidos() {
        let cli = Cli::try_parse_from([
            "client",
            "submit",
            "--url",
            "http://a/1",
            "--url",
            "http://a/2",
            "--selector",
            "title: h1",
            "--selector",
            "img: img@src",
            "--name",
            "noticias",
        ])
        .unwrap();

        match cli.command {
            Commands::Submit {
                urls,
                selectors,
                name,
                follow_links,
            } => {
                assert!(!follow_links);
                assert_eq!(urls, vec!["http://a/1", "http://a/2"]);
                assert_eq!(selectors.lines.len(), 2);
                assert_eq!(name.as_deref(), Some("noticias"));
            }
            other => panic!("comando inesperado: {other:?}"),
        }
    }

    #[test]
    fn quick_acepta_follow_links() {
        let cli =
            Cli::try_parse_from(["client", "quick", "http://a/lista", "--follow-links"]).unwrap();
        match cli.command {
            Commands::Quick { follow_links, .. } => assert!(follow_links),
            other => panic!("comando inesperado: {other:?}"),
        }
    }

    #[test]
    fn export_rechaza_formato_desconocido() {
        assert!(Cli::try_parse_from(["client", "export", "abc", "--format", "pdf"]).is_err());

        let cli = Cli::try_parse_from(["client", "export", "abc", "--format", "csv"]).unwrap();
        match cli.command {
            Commands::Export { format, .. } => assert_eq!(format, ExportFormat::Csv),
            other => panic!("comando inesperado: {other:?}"),
        }
    }

    #[test]
    fn sin_selectores_es_auto_detect() {
        assert!(parse_selectors("").unwrap().is_none());
        assert!(parse_selectors("\n  \n").unwrap().is_none());
    }

    #[test]
    fn selectores_en_lineas() {
        let map = parse_selectors("title: h1\nlink: a@href").unwrap().unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("title").unwrap().mode, ExtractMode::Text);
        assert_eq!(
            map.get("link").unwrap().mode,
            ExtractMode::Attr("href".to_string())
        );
        assert!(parse_selectors("title: h1\ntitle: h2").is_err());
    }

    #[test]
    fn preview_corta_textos_largos() {
        assert_eq!(preview("corto"), "corto");
        let long = "가".repeat(100);
        let cut = preview(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 63);
    }
}
