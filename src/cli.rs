//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::form::{RatingField, SurveyForm};
use crate::models::{Department, InjectionSite, NeedleSize, PatientAgeGroup};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// IV-Care - clinical feedback collector for IV injection procedures
///
/// Record post-procedure feedback from nursing staff, review the
/// aggregated dashboard, export CSV, and request a narrative analysis
/// from a local model.
///
/// Examples:
///   ivcare submit --department er --experience 5 --site forearm --confidence 4
///   ivcare dashboard --format json --output dashboard.json
///   ivcare list --limit 20
///   ivcare export --output-dir exports/
///   ivcare analyze --model llama3.2:latest --output analysis.md
///   ivcare --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(subcommand_required = false, arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .ivcare.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the record store
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Fail when the stored records cannot be read
    ///
    /// Without this flag unreadable records are kept aside as a backup and
    /// the example records are shown instead.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .ivcare.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Record one feedback submission
    Submit(SubmitArgs),

    /// Summarize all recorded feedback
    Dashboard {
        /// Output format (markdown, json)
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,

        /// Write the dashboard to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Append the full records table
        #[arg(long)]
        records: bool,
    },

    /// Show recorded feedback, newest first
    List {
        /// Show at most this many records
        #[arg(long, value_name = "COUNT")]
        limit: Option<usize>,
    },

    /// Export all records as CSV
    Export {
        /// Directory to write the export into
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Request a narrative analysis of the recorded feedback
    Analyze(AnalyzeArgs),
}

/// Answers for one submission. Numeric answers are free text and parsed
/// permissively.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SubmitArgs {
    /// Department (er, icu, general, or, outpatient, or the label itself)
    #[arg(long, default_value_t = Department::General)]
    pub department: Department,

    /// Years of experience
    #[arg(long, default_value = "0", value_name = "YEARS")]
    pub experience: String,

    /// Recommender names, separated by 、 or commas
    #[arg(long, value_name = "NAMES")]
    pub recommender: Option<String>,

    /// Patient age group (neonate, child, adult, elderly)
    #[arg(long, default_value_t = PatientAgeGroup::Adult)]
    pub patient: PatientAgeGroup,

    /// Injection site (dorsum, forearm, acf, foot, other)
    #[arg(long, default_value_t = InjectionSite::Forearm)]
    pub site: InjectionSite,

    /// Needle size (18, 20, 22, 24, safety)
    #[arg(long, default_value_t = NeedleSize::G22)]
    pub needle: NeedleSize,

    /// Confidence, 1-5
    #[arg(long, default_value = "3", value_name = "1-5")]
    pub confidence: String,

    /// Technique success, 1-5
    #[arg(long, default_value = "3", value_name = "1-5")]
    pub technique: String,

    /// Equipment satisfaction, 1-5
    #[arg(long, default_value = "3", value_name = "1-5")]
    pub equipment: String,

    /// Patient cooperation, 1-5
    #[arg(long, default_value = "3", value_name = "1-5")]
    pub cooperation: String,

    /// Pain management, 1-5
    #[arg(long, default_value = "3", value_name = "1-5")]
    pub pain: String,

    /// Environmental stress, 1-5
    #[arg(long, default_value = "3", value_name = "1-5")]
    pub stress: String,

    /// Challenges met during the procedure (repeatable)
    ///
    /// Example: --challenge 血管脆弱 --challenge 光線不足
    #[arg(long = "challenge", value_name = "LABEL")]
    pub challenges: Vec<String>,

    /// Free-text feedback
    #[arg(long, default_value = "", value_name = "TEXT")]
    pub feedback: String,
}

impl SubmitArgs {
    /// Fill a form from the raw answers.
    pub fn to_form(&self) -> SurveyForm {
        let mut form = SurveyForm::new();

        form.department = self.department;
        form.set_experience_years(&self.experience);
        form.recommender = self.recommender.clone().unwrap_or_default();
        form.patient_age_group = self.patient;
        form.injection_site = self.site;
        form.needle_size = self.needle;

        let ratings = [
            (RatingField::Confidence, &self.confidence),
            (RatingField::Technique, &self.technique),
            (RatingField::Equipment, &self.equipment),
            (RatingField::PatientCooperation, &self.cooperation),
            (RatingField::PainManagement, &self.pain),
            (RatingField::EnvironmentStress, &self.stress),
        ];
        for (field, raw) in ratings {
            form.set_rating(field, raw);
        }

        // Repeating --challenge must not remove the label again.
        for label in &self.challenges {
            if !form.challenges().iter().any(|c| c == label.trim()) {
                form.toggle_challenge(label);
            }
        }
        form.feedback_text = self.feedback.clone();

        form
    }
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Ollama model to use for analysis
    ///
    /// Can also be set via IVCARE_MODEL env var or .ivcare.toml config.
    #[arg(short, long, env = "IVCARE_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Request timeout in seconds
    ///
    /// The fallback analysis is shown when the model does not answer in
    /// time. Default: from config or 120s.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Write the dashboard with the analysis appended to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Output format for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.command.is_none() {
            return Err("A subcommand is required (see --help)".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Some(Command::Analyze(analyze)) => {
                if let Some(ref url) = analyze.ollama_url {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
                    }
                }

                if let Some(temperature) = analyze.temperature {
                    if !(0.0..=1.0).contains(&temperature) {
                        return Err("Temperature must be between 0.0 and 1.0".to_string());
                    }
                }

                if analyze.timeout == Some(0) {
                    return Err("Timeout must be at least 1 second".to_string());
                }
            }
            Some(Command::List { limit: Some(0) }) => {
                return Err("Limit must be at least 1".to_string());
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings. `config_verbose`
    /// is the `[general] verbose` setting; `--quiet` overrides it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rating;

    fn make_args(command: Command) -> Args {
        Args {
            command: Some(command),
            config: None,
            data_dir: None,
            strict: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    fn analyze(args: AnalyzeArgs) -> Args {
        make_args(Command::Analyze(args))
    }

    #[test]
    fn test_parse_submit() {
        let args = Args::try_parse_from([
            "ivcare",
            "submit",
            "--department",
            "icu",
            "--experience",
            "7",
            "--site",
            "肘窩 (ACF)",
            "--confidence",
            "5",
            "--challenge",
            "血管脆弱",
            "--challenge",
            "光線不足",
        ])
        .unwrap();

        let Some(Command::Submit(submit)) = args.command else {
            panic!("expected submit");
        };
        assert_eq!(submit.department, Department::Icu);
        assert_eq!(submit.site, InjectionSite::Acf);
        assert_eq!(submit.needle, NeedleSize::G22);
        assert_eq!(submit.challenges.len(), 2);
    }

    #[test]
    fn test_submit_to_form_is_permissive() {
        let submit = SubmitArgs {
            experience: "abc".to_string(),
            confidence: "9".to_string(),
            technique: "5".to_string(),
            recommender: Some("  ".to_string()),
            ..SubmitArgs::default()
        };

        let form = submit.to_form();
        assert_eq!(form.experience_years, 0);
        assert_eq!(form.confidence_level, Rating::default());
        assert_eq!(form.technique_rating.get(), 5);

        let record = form.submit();
        assert_eq!(record.recommender, None);
    }

    #[test]
    fn test_repeated_challenge_is_kept_once() {
        let args = Args::try_parse_from([
            "ivcare",
            "submit",
            "--challenge",
            "血管脆弱",
            "--challenge",
            "光線不足",
            "--challenge",
            " 血管脆弱 ",
        ])
        .unwrap();

        let Some(Command::Submit(submit)) = args.command else {
            panic!("expected submit");
        };
        let record = submit.to_form().submit();
        assert_eq!(record.top_challenges, vec!["血管脆弱", "光線不足"]);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["ivcare", "list", "--limit", "5", "--data-dir", "/tmp/x", "-v"])
                .unwrap();
        assert!(args.verbose);
        assert!(!args.strict);
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(args.command, Some(Command::List { limit: Some(5) })));
    }

    #[test]
    fn test_parse_strict_flag() {
        let args = Args::try_parse_from(["ivcare", "dashboard", "--strict"]).unwrap();
        assert!(args.strict);
    }

    #[test]
    fn test_validation_invalid_url() {
        let args = analyze(AnalyzeArgs {
            ollama_url: Some("localhost:11434".to_string()),
            ..AnalyzeArgs::default()
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_temperature_and_timeout() {
        let args = analyze(AnalyzeArgs {
            temperature: Some(1.5),
            ..AnalyzeArgs::default()
        });
        assert!(args.validate().is_err());

        let args = analyze(AnalyzeArgs {
            timeout: Some(0),
            ..AnalyzeArgs::default()
        });
        assert!(args.validate().is_err());

        let args = analyze(AnalyzeArgs::default());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(Command::List { limit: None });
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_requires_command() {
        let mut args = make_args(Command::List { limit: None });
        args.command = None;
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::List { limit: None });
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_config_verbose_raises_log_level() {
        let mut args = make_args(Command::List { limit: None });
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
