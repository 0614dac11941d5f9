use acutrack_core::treatment;
use acutrack_core::*;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "acutrack")]
#[command(about = "Acupuncture patient and needle tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Register, list, edit and delete patients
    #[command(subcommand)]
    Patient(PatientCommand),

    /// Count needles and manage treatment sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Manage patient groups and the acupoint list
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Format a selection of acupoints for a treatment
    Acupoints {
        /// Acupoint names from the configured list
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Append a patient's sessions to a CSV file
    Export {
        /// Patient id or medical record number
        patient: String,

        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum PatientCommand {
    /// Register a new patient
    Add {
        #[arg(long)]
        mrn: String,
        #[arg(long)]
        name: String,
        /// male/female (男/女)
        #[arg(long)]
        gender: Gender,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        bed: Option<String>,
    },

    /// List patients, newest first
    List {
        /// Filter by name or medical record number
        #[arg(long)]
        search: Option<String>,
    },

    /// Show a patient and their sessions
    Show { patient: String },

    /// Update patient fields (empty --group/--bed clears them)
    Edit {
        patient: String,
        #[arg(long)]
        mrn: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        gender: Option<Gender>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        bed: Option<String>,
    },

    /// Delete a patient together with all their sessions
    Delete {
        patient: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Add needles to a region of the patient's draft session
    Tap {
        patient: String,
        region: BodyRegion,
        #[arg(long, default_value_t = 1)]
        times: u32,
    },

    /// Remove needles from a region of the patient's draft session
    Untap {
        patient: String,
        region: BodyRegion,
        #[arg(long, default_value_t = 1)]
        times: u32,
    },

    /// Zero one region of the draft, or all regions when none is given
    Reset {
        patient: String,
        region: Option<BodyRegion>,
    },

    /// Show the patient's draft session
    Draft { patient: String },

    /// Save the patient's draft session
    Save { patient: String },

    /// Record a complete session in one step
    Record {
        patient: String,
        #[command(flatten)]
        counts: RegionArgs,
    },

    /// Change the counts of a saved session
    Edit {
        session: Uuid,
        #[command(flatten)]
        counts: RegionArgs,
    },

    /// Mark the needles of a session as removed
    RemoveNeedles { session: Uuid },

    /// List a patient's sessions, newest first
    List {
        patient: String,
        /// Print sessions as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Show groups and acupoints
    Show,
    /// Add a patient group
    AddGroup { name: String },
    /// Rename a patient group
    RenameGroup { id: String, name: String },
    /// Delete a patient group
    DeleteGroup { id: String },
    /// Set the number of acupoints (1-200)
    AcupointCount { count: usize },
    /// Rename the acupoint at a 1-based position
    RenameAcupoint { position: usize, name: String },
}

/// Per-region needle counts given on the command line
#[derive(Args, Debug)]
struct RegionArgs {
    #[arg(long)]
    head: Option<u32>,
    #[arg(long)]
    trunk: Option<u32>,
    #[arg(long)]
    left_arm: Option<u32>,
    #[arg(long)]
    right_arm: Option<u32>,
    #[arg(long)]
    left_leg: Option<u32>,
    #[arg(long)]
    right_leg: Option<u32>,
}

impl RegionArgs {
    fn get(&self, region: BodyRegion) -> Option<u32> {
        match region {
            BodyRegion::Head => self.head,
            BodyRegion::Trunk => self.trunk,
            BodyRegion::LeftArm => self.left_arm,
            BodyRegion::RightArm => self.right_arm,
            BodyRegion::LeftLeg => self.left_leg,
            BodyRegion::RightLeg => self.right_leg,
        }
    }

    /// Overwrite the counter's regions that were given
    fn apply(&self, counter: &mut SessionCounter) {
        for region in BodyRegion::ALL {
            if let Some(count) = self.get(region) {
                counter.set_count(region, count);
            }
        }
    }
}

/// Paths of everything kept in the data directory
struct DataPaths {
    dir: PathBuf,
}

impl DataPaths {
    fn store(&self) -> JsonStore {
        JsonStore::in_dir(&self.dir)
    }

    fn settings(&self) -> JsonSettingsStore {
        JsonSettingsStore::in_dir(&self.dir)
    }

    fn drafts(&self) -> PathBuf {
        self.dir.join("drafts.json")
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_with_level(logging::level_for_verbosity(cli.verbose));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            eprintln!("{}", notice(&e));
            ExitCode::FAILURE
        }
    }
}

/// One-line message for the user, worded by error kind
fn notice(error: &Error) -> String {
    match error.kind() {
        ErrorKind::Conflict => format!("✗ {}. Use a different medical record number.", error),
        ErrorKind::NotFound => format!("✗ {}. Run `acutrack patient list` to see patients.", error),
        ErrorKind::Validation => format!("✗ {}", error),
        ErrorKind::TransientStore => format!("✗ {}. Nothing was lost; try again.", error),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let paths = DataPaths {
        dir: cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone()),
    };

    match cli.command {
        Commands::Patient(cmd) => cmd_patient(&paths, &config, cmd),
        Commands::Session(cmd) => cmd_session(&paths, cmd),
        Commands::Settings(cmd) => cmd_settings(&paths, cmd),
        Commands::Acupoints { names } => cmd_acupoints(&paths, &names),
        Commands::Export { patient, out } => cmd_export(&paths, &patient, &out),
    }
}

fn cmd_patient(paths: &DataPaths, config: &Config, cmd: PatientCommand) -> Result<()> {
    let mut store = paths.store();

    match cmd {
        PatientCommand::Add {
            mrn,
            name,
            gender,
            group,
            bed,
        } => {
            let group = group.or_else(|| config.treatment.default_group.clone());
            warn_unknown_group(paths, group.as_deref())?;
            let fields = NewPatient {
                patient_group: group,
                bed_number: bed,
                ..NewPatient::new(mrn, name, gender)
            };
            let patient = treatment::register_patient(&mut store, fields)?;
            println!("✓ Registered patient {}", patient.id);
            print_patient(&patient);
        }

        PatientCommand::List { search } => {
            let summaries = treatment::list_patients(&store, search.as_deref())?;
            if summaries.is_empty() {
                println!(
                    "{}",
                    if search.is_some() {
                        "No matching patients."
                    } else {
                        "No patients yet."
                    }
                );
            }
            for summary in summaries {
                let p = &summary.patient;
                let last = summary
                    .last_session
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{}  {}  {} ({})  group: {}  sessions: {}  last: {}",
                    p.id,
                    p.medical_record_number,
                    p.name,
                    p.gender,
                    p.patient_group.as_deref().unwrap_or("-"),
                    summary.session_count,
                    last
                );
            }
        }

        PatientCommand::Show { patient } => {
            let patient = treatment::resolve_patient(&store, &patient)?;
            print_patient(&patient);
            let sessions = store.list_sessions(patient.id)?;
            println!("  Sessions: {}", sessions.len());
            for session in &sessions {
                print_session(session);
            }
        }

        PatientCommand::Edit {
            patient,
            mrn,
            name,
            gender,
            group,
            bed,
        } => {
            let patient = treatment::resolve_patient(&store, &patient)?;
            warn_unknown_group(paths, group.as_deref().filter(|g| !g.trim().is_empty()))?;
            let patch = PatientPatch {
                medical_record_number: mrn,
                name,
                gender,
                patient_group: group,
                bed_number: bed,
            };
            let updated = treatment::edit_patient(&mut store, patient.id, patch)?;
            println!("✓ Updated patient {}", updated.id);
            print_patient(&updated);
        }

        PatientCommand::Delete { patient, yes } => {
            let patient = treatment::resolve_patient(&store, &patient)?;
            if !yes {
                return Err(Error::Validation(format!(
                    "deleting {} ({}) removes all their sessions; pass --yes to confirm",
                    patient.name, patient.medical_record_number
                )));
            }
            treatment::delete_patient(&mut store, patient.id)?;
            DraftBook::update(&paths.drafts(), |book| {
                book.discard(patient.id);
                Ok(())
            })?;
            println!("✓ Deleted patient {} and their sessions", patient.id);
        }
    }

    Ok(())
}

fn cmd_session(paths: &DataPaths, cmd: SessionCommand) -> Result<()> {
    let mut store = paths.store();
    let drafts_path = paths.drafts();

    match cmd {
        SessionCommand::Tap {
            patient,
            region,
            times,
        } => {
            let patient = treatment::resolve_patient(&store, &patient)?;
            let counter = DraftBook::update(&drafts_path, |book| {
                let counter = book.counter_mut(patient.id);
                counter.add(region, times);
                Ok(counter.clone())
            })?;
            print_counter(&counter);
        }

        SessionCommand::Untap {
            patient,
            region,
            times,
        } => {
            let patient = treatment::resolve_patient(&store, &patient)?;
            let counter = DraftBook::update(&drafts_path, |book| {
                let counter = book.counter_mut(patient.id);
                counter.remove(region, times);
                Ok(counter.clone())
            })?;
            print_counter(&counter);
        }

        SessionCommand::Reset { patient, region } => {
            let patient = treatment::resolve_patient(&store, &patient)?;
            let counter = DraftBook::update(&drafts_path, |book| {
                let counter = book.counter_mut(patient.id);
                match region {
                    Some(region) => counter.reset_one(region),
                    None => counter.reset_all(),
                }
                Ok(counter.clone())
            })?;
            match region {
                Some(region) => println!("✓ Reset {} ({})", region, region.label()),
                None => println!("✓ Reset all regions"),
            }
            print_counter(&counter);
        }

        SessionCommand::Draft { patient } => {
            let patient = treatment::resolve_patient(&store, &patient)?;
            let book = DraftBook::load(&drafts_path)?;
            match book.counter(patient.id) {
                Some(counter) => print_counter(counter),
                None => print_counter(&SessionCounter::new()),
            }
        }

        SessionCommand::Save { patient } => {
            let patient = treatment::resolve_patient(&store, &patient)?;
            // On failure the draft file is left untouched for a retry
            let session = DraftBook::update(&drafts_path, |book| {
                let mut counter = book.counter(patient.id).cloned().unwrap_or_default();
                let session = treatment::save_session(&mut store, &mut counter, patient.id)?;
                book.discard(patient.id);
                Ok(session)
            })?;
            println!(
                "✓ Saved session {} ({} needles)",
                session.id, session.total_needles
            );
        }

        SessionCommand::Record { patient, counts } => {
            let patient = treatment::resolve_patient(&store, &patient)?;
            let mut counter = SessionCounter::new();
            counts.apply(&mut counter);
            let session = treatment::save_session(&mut store, &mut counter, patient.id)?;
            println!(
                "✓ Saved session {} ({} needles)",
                session.id, session.total_needles
            );
        }

        SessionCommand::Edit { session, counts } => {
            let record = store.get_session(session)?;
            let mut counter = SessionCounter::from_record(&record);
            counts.apply(&mut counter);
            let updated = treatment::save_session(&mut store, &mut counter, record.patient_id)?;
            println!(
                "✓ Updated session {} ({} needles)",
                updated.id, updated.total_needles
            );
        }

        SessionCommand::RemoveNeedles { session } => {
            let updated =
                treatment::complete_needle_removal(&mut store, session, chrono::Utc::now())?;
            if let Some(removed_at) = updated.needle_removal_time {
                println!(
                    "✓ Needles removed for session {} at {}",
                    updated.id,
                    removed_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        SessionCommand::List { patient, json } => {
            let patient = treatment::resolve_patient(&store, &patient)?;
            let sessions = store.list_sessions(patient.id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("No sessions for {}.", patient.name);
            } else {
                for session in &sessions {
                    print_session(session);
                }
            }
        }
    }

    Ok(())
}

fn cmd_settings(paths: &DataPaths, cmd: SettingsCommand) -> Result<()> {
    let mut store = paths.settings();

    let settings = match cmd {
        SettingsCommand::Show => store.load()?,
        SettingsCommand::AddGroup { name } => store.update(|s| {
            let group = s.add_group(&name)?;
            println!("✓ Added group {} ({})", group.name, group.id);
            Ok(())
        })?,
        SettingsCommand::RenameGroup { id, name } => store.update(|s| s.rename_group(&id, &name))?,
        SettingsCommand::DeleteGroup { id } => store.update(|s| {
            let removed = s.delete_group(&id)?;
            println!("✓ Deleted group {}", removed.name);
            Ok(())
        })?,
        SettingsCommand::AcupointCount { count } => store.update(|s| {
            let applied = s.resize_acupoints(count);
            if applied != count {
                println!("Acupoint count must be between 1 and 200; using {}", applied);
            }
            Ok(())
        })?,
        SettingsCommand::RenameAcupoint { position, name } => store.update(|s| {
            let index = position.checked_sub(1).ok_or_else(|| {
                Error::Validation("acupoint positions start at 1".into())
            })?;
            s.rename_acupoint(index, &name)
        })?,
    };

    println!("Groups:");
    for group in &settings.groups {
        println!("  {:>3}  {}", group.id, group.name);
    }
    println!("Acupoints ({}):", settings.acupoints.count);
    println!("  {}", settings.acupoints.names.join(" "));
    Ok(())
}

fn cmd_acupoints(paths: &DataPaths, names: &[String]) -> Result<()> {
    let settings = paths.settings().load()?;
    let mut selection = AcupointSelection::new(&settings.acupoints);
    for name in names {
        if !selection.is_selected(name.trim()) {
            selection.toggle(name)?;
        }
    }
    println!("{}", selection.label());
    Ok(())
}

fn cmd_export(paths: &DataPaths, patient: &str, out: &Path) -> Result<()> {
    let store = paths.store();
    let patient = treatment::resolve_patient(&store, patient)?;
    let sessions = store.list_sessions(patient.id)?;
    let written = export_sessions_csv(&patient, &sessions, out)?;
    println!("✓ Exported {} sessions to {}", written, out.display());
    Ok(())
}

fn warn_unknown_group(paths: &DataPaths, group: Option<&str>) -> Result<()> {
    if let Some(group) = group {
        let settings = paths.settings().load()?;
        if !settings.group_names().contains(&group.trim()) {
            println!("Note: group \"{}\" is not in the configured group list", group);
        }
    }
    Ok(())
}

fn print_patient(patient: &PatientRecord) {
    println!("  {} ({})", patient.name, patient.gender);
    println!("  MRN: {}", patient.medical_record_number);
    if let Some(group) = &patient.patient_group {
        println!("  Group: {}", group);
    }
    if let Some(bed) = &patient.bed_number {
        println!("  Bed: {}", bed);
    }
}

fn print_counter(counter: &SessionCounter) {
    for (region, count) in counter.counts().iter() {
        println!("  {:<10} {:<4} {}", region.id(), region.label(), count);
    }
    println!(
        "  Total: {} needles in {} regions",
        counter.total(),
        counter.active_region_count()
    );
}

fn print_session(session: &SessionRecord) {
    let counts: Vec<String> = session
        .counts
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(region, n)| format!("{}={}", region, n))
        .collect();
    let removal = match session.needle_removal_time {
        Some(t) => format!("removed {}", t.format("%H:%M")),
        None => "needles in".to_string(),
    };
    println!(
        "  {}  {}  total={}  [{}]  {}",
        session.id,
        session.created_at.format("%Y-%m-%d %H:%M"),
        session.total_needles,
        counts.join(" "),
        removal
    );
}
