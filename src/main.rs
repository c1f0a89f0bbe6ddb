use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod batch;
mod config;
mod docx;
mod error;
mod evidence;
mod fill;
mod interview;
mod layout;
mod models;
mod provision;
mod report;
mod roster;
mod sheet;
mod summary;
mod tracking;

use config::Session;
use error::CaseError;
use evidence::EvidencePhoto;
use models::{Outcome, StudentRecord, StudentResult, StudentStatus};
use sheet::{Workbook, WEEKLY_SHEET};

const LOG_ENV: &str = "CASE_FILES_LOG";

#[derive(Parser)]
#[command(name = "case-files")]
#[command(about = "Student case file manager for Group Scholar tutoring staff", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $CASE_FILES_CONFIG, then the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("selection")
        .args(["student", "all"])
        .required(true)
        .multiple(false)
))]
struct Batch {
    /// Student ID from the roster; repeat for several students
    #[arg(long = "student", value_name = "ID")]
    student: Vec<String>,
    /// Every student in the roster
    #[arg(long)]
    all: bool,
    /// Also write the batch summary as markdown
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load or inspect the student roster
    Roster {
        #[command(subcommand)]
        action: RosterAction,
    },
    /// Inspect or change the persisted configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Create student folders from the template folder
    Provision {
        /// Inner folder prefix, the text before '@'
        #[arg(long)]
        prefix: String,
        /// Root folder for student folders; remembered for later runs
        #[arg(long)]
        root: Option<PathBuf>,
        /// Template folder; remembered for later runs
        #[arg(long)]
        templates: Option<PathBuf>,
        #[command(flatten)]
        batch: Batch,
    },
    /// Replace placeholders in every document of the selected students
    Fill {
        #[arg(long)]
        tutor: String,
        #[command(flatten)]
        batch: Batch,
    },
    /// Log the latest weekly report entry into each tracking document
    Log {
        #[arg(long)]
        report: PathBuf,
        #[arg(long)]
        tutor: String,
        /// si, no, na, tarea or justificada
        #[arg(long)]
        outcome: Outcome,
        /// Zero-based sheet index of the weekly report. Defaults to the third
        /// sheet, or to the only sheet of a CSV or single-sheet workbook
        #[arg(long)]
        sheet: Option<usize>,
        /// Photo to file as session evidence
        #[arg(long, requires = "activity")]
        evidence: Option<PathBuf>,
        /// Activity name used in the evidence file name
        #[arg(long, requires = "evidence")]
        activity: Option<String>,
        #[command(flatten)]
        batch: Batch,
    },
    /// Log the latest entry of every sheet of a consolidated report
    Consolidate {
        #[arg(long)]
        report: PathBuf,
        #[arg(long)]
        tutor: String,
        #[command(flatten)]
        batch: Batch,
    },
    /// Append photos to the interview document
    Interview {
        #[arg(long, num_args = 1.., required = true)]
        images: Vec<PathBuf>,
        #[command(flatten)]
        batch: Batch,
    },
}

#[derive(Subcommand)]
enum RosterAction {
    /// Read a roster spreadsheet and keep a snapshot for later commands
    Load { file: PathBuf },
    /// List the students of the last loaded roster
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    SetRoot { dir: PathBuf },
    SetTemplates { dir: PathBuf },
    /// Add a tutor to the list accepted by --tutor
    AddTutor { name: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn selected(session: &mut Session, batch: &Batch) -> anyhow::Result<Vec<StudentRecord>> {
    let roster = session.roster()?;
    let students = roster::select(roster, &batch.student, batch.all)?;
    Ok(students.into_iter().cloned().collect())
}

fn finish_batch(command: &str, results: &[StudentResult], out: Option<&Path>) -> anyhow::Result<()> {
    for line in summary::console_lines(results) {
        println!("{line}");
    }
    if let Some(out) = out {
        let now = chrono::Local::now().naive_local();
        std::fs::write(out, summary::build_summary(command, now, results))
            .with_context(|| format!("failed to write summary {}", out.display()))?;
        println!("Summary written to {}.", out.display());
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut session = Session::open(cli.config)?;

    match cli.command {
        Commands::Roster { action } => match action {
            RosterAction::Load { file } => {
                let loaded = roster::load_roster(&file)?;
                let snapshot = session.config.snapshot_path()?;
                roster::write_snapshot(&loaded, &snapshot)?;
                session.set_roster(loaded);
                let count = session.roster()?.students.len();
                println!("Loaded {count} students from {}.", file.display());
            }
            RosterAction::List => {
                let roster = session.roster()?;
                println!("Roster {} ({} students):", roster.source.display(), roster.students.len());
                for student in &roster.students {
                    println!("- {} {} ({}, {})", student.id, student.full_name, student.program, student.period);
                }
            }
        },
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => {
                    println!("Configuration file: {}", session.config_path.display());
                    println!("{}", serde_json::to_string_pretty(&session.config)?);
                    return Ok(());
                }
                ConfigAction::SetRoot { dir } => session.config.root_folder = Some(dir),
                ConfigAction::SetTemplates { dir } => session.config.template_folder = Some(dir),
                ConfigAction::AddTutor { name } => {
                    let name = name.trim().to_string();
                    if name.is_empty() {
                        return Err(CaseError::UnknownTutor(name).into());
                    }
                    if !session.config.tutors.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
                        session.config.tutors.push(name);
                    }
                }
            }
            session.save_config()?;
            println!("Configuration saved to {}.", session.config_path.display());
        }
        Commands::Provision {
            prefix,
            root,
            templates,
            batch,
        } => {
            if root.is_some() || templates.is_some() {
                if root.is_some() {
                    session.config.root_folder = root;
                }
                if templates.is_some() {
                    session.config.template_folder = templates;
                }
                session.save_config()?;
            }
            let students = selected(&mut session, &batch)?;
            let root = session.config.root_folder()?.to_path_buf();
            std::fs::create_dir_all(&root)
                .with_context(|| format!("failed to create root folder {}", root.display()))?;
            let templates = session.config.template_folder.clone().ok_or_else(|| {
                CaseError::MissingSource(
                    "template folder is not configured; pass --templates <DIR>".to_string(),
                )
            })?;

            let results = batch::run_batch(&students, |student| {
                if !provision::is_provisionable(student) {
                    return Ok(StudentStatus::Skipped(
                        "missing name, ID, program or period".to_string(),
                    ));
                }
                let report = provision::provision_student(&root, &templates, &prefix, student)?;
                Ok(StudentStatus::Done(format!(
                    "{} files copied, {} kept in {}",
                    report.copied,
                    report.kept,
                    file_name(&report.student_folder)
                )))
            });
            finish_batch("provision", &results, batch.summary.as_deref())?;
        }
        Commands::Fill { tutor, batch } => {
            let tutor = session.config.resolve_tutor(&tutor)?;
            let students = selected(&mut session, &batch)?;
            let root = session.config.root_folder()?.to_path_buf();
            let now = chrono::Local::now().naive_local();

            let results = batch::run_batch(&students, |student| {
                let report = fill::fill_student(&root, student, &tutor, now)?;
                let mut detail = format!(
                    "{} documents updated, {} unchanged",
                    report.updated.len(),
                    report.unchanged
                );
                if !report.failed.is_empty() {
                    detail.push_str(&format!(", {} failed", report.failed.len()));
                }
                Ok(StudentStatus::Done(detail))
            });
            finish_batch("fill", &results, batch.summary.as_deref())?;
        }
        Commands::Log {
            report,
            tutor,
            outcome,
            sheet,
            evidence,
            activity,
            batch,
        } => {
            let tutor = session.config.resolve_tutor(&tutor)?;
            let students = selected(&mut session, &batch)?;
            let root = session.config.root_folder()?.to_path_buf();
            let config = session.config.clone();

            let workbook = Workbook::open(&report)?;
            let grid = workbook.weekly_sheet(sheet).ok_or_else(|| {
                let index = sheet.unwrap_or(WEEKLY_SHEET);
                CaseError::MissingSource(format!("sheet {index} of {}", report.display()))
            })?;
            let table = report::read_report(grid, &config.report_layout)?;
            let photo = match (evidence, activity) {
                (Some(image), Some(activity)) => Some(EvidencePhoto { image, activity }),
                _ => None,
            };

            let results = batch::run_batch(&students, |student| {
                let log = tracking::log_weekly(&root, student, &table, outcome, &tutor, &config)?;
                if !log.inserted {
                    return Ok(StudentStatus::Skipped(format!(
                        "no changes: {} / {} already logged",
                        log.entry.date, log.entry.topic
                    )));
                }

                let mut detail = format!("logged {} / {}", log.entry.date, log.entry.topic);
                let wants_evidence = match outcome.recorded() {
                    Outcome::Attended => photo.is_some(),
                    Outcome::Absent => true,
                    _ => false,
                };
                if wants_evidence {
                    let filed = evidence::evidence_folder(&root, student, &config).and_then(|folder| {
                        evidence::record_evidence(&folder, student, outcome, photo.as_ref())
                    });
                    match filed {
                        Ok(Some(path)) => detail.push_str(&format!(", evidence {}", file_name(&path))),
                        Ok(None) => {}
                        Err(err) => {
                            tracing::warn!(student = %student.id, error = %format!("{err:#}"), "evidence not filed");
                            return Ok(StudentStatus::Failed(format!(
                                "{detail}, but evidence was not filed: {err:#}"
                            )));
                        }
                    }
                }
                Ok(StudentStatus::Done(detail))
            });
            finish_batch("log", &results, batch.summary.as_deref())?;
        }
        Commands::Consolidate {
            report,
            tutor,
            batch,
        } => {
            let tutor = session.config.resolve_tutor(&tutor)?;
            let students = selected(&mut session, &batch)?;
            let root = session.config.root_folder()?.to_path_buf();
            let config = session.config.clone();
            let workbook = Workbook::open(&report)?;

            let results = batch::run_batch(&students, |student| {
                let log = tracking::consolidate_student(&root, student, &workbook, &tutor, &config)?;
                if log.inserted == 0 {
                    return Ok(StudentStatus::Skipped(format!(
                        "no changes ({} entries already logged)",
                        log.duplicates
                    )));
                }
                Ok(StudentStatus::Done(format!(
                    "{} rows inserted, {} already logged",
                    log.inserted, log.duplicates
                )))
            });
            finish_batch("consolidate", &results, batch.summary.as_deref())?;
        }
        Commands::Interview { images, batch } => {
            let students = selected(&mut session, &batch)?;
            let root = session.config.root_folder()?.to_path_buf();
            let config = session.config.clone();

            let results = batch::run_batch(&students, |student| {
                let (document, count) = interview::interview_student(&root, student, &images, &config)?;
                Ok(StudentStatus::Done(format!(
                    "{count} images added to {}",
                    file_name(&document)
                )))
            });
            finish_batch("interview", &results, batch.summary.as_deref())?;
        }
    }

    Ok(())
}
