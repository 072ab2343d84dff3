use std::fmt;
use std::path::PathBuf;

use prep_core::model::{
    AccountId, DEFAULT_QUESTION_COUNT, DifficultyFilter, QUESTION_COUNT_PRESETS,
};

use crate::config::AppConfig;

#[derive(Debug, PartialEq, Eq)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    Conflicting { first: &'static str, second: &'static str },
    InvalidCount { raw: String },
    InvalidDifficulty { raw: String },
    InvalidAccountId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::Conflicting { first, second } => {
                write!(f, "{first} cannot be combined with {second}")
            }
            ArgsError::InvalidCount { raw } => write!(f, "invalid --count value: {raw}"),
            ArgsError::InvalidDifficulty { raw } => write!(f, "invalid --difficulty value: {raw}"),
            ArgsError::InvalidAccountId { raw } => write!(f, "invalid --id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app register --email <email> --password <pw> [--username <name>]");
    eprintln!("               [--admin [--as-email <admin email> --as-password <admin pw>]]");
    eprintln!("  app practice (--email <email> --password <pw> | --guest)");
    eprintln!("               [--count <n>] [--module <name>]... [--difficulty <level>]");
    eprintln!("               [--struggle] [--resume | --new]");
    eprintln!("  app stats --email <email> --password <pw>");
    eprintln!("  app accounts --email <email> --password <pw>");
    eprintln!("  app delete-account --email <email> --password <pw> --id <account-id>");
    eprintln!();
    eprintln!("Global flags:");
    eprintln!("  --db <sqlite_url>   (default {})", crate::config::DEFAULT_DB_URL);
    eprintln!("  --bank <path>       (default {})", crate::config::DEFAULT_QUESTION_BANK);
    eprintln!();
    let presets: Vec<String> = QUESTION_COUNT_PRESETS.iter().map(u32::to_string).collect();
    eprintln!(
        "Question count: any positive number; presets {} (default {DEFAULT_QUESTION_COUNT}).",
        presets.join(", ")
    );
    eprintln!("Difficulty: easy, medium, hard, mixed (default mixed).");
    eprintln!("Registering an administrator needs an existing administrator");
    eprintln!("  (--as-email/--as-password), unless none exists yet.");
    eprintln!("During practice: type an option key, Enter to continue,");
    eprintln!("  s to save and exit, q to abandon the session.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PREP_DB_URL, PREP_QUESTION_BANK, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Account(Credentials),
    Guest,
}

/// How to treat an existing checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    #[default]
    Ask,
    Resume,
    New,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeArgs {
    pub identity: Identity,
    pub count: Option<u32>,
    pub modules: Vec<String>,
    pub difficulty: DifficultyFilter,
    pub struggle: bool,
    pub start: StartMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register {
        email: String,
        username: String,
        password: String,
        admin: bool,
        /// Administrator authorizing an `--admin` registration.
        actor: Option<Credentials>,
    },
    Practice(PracticeArgs),
    Stats(Credentials),
    Accounts(Credentials),
    DeleteAccount {
        credentials: Credentials,
        id: AccountId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub db_url: String,
    pub bank: PathBuf,
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Register,
    Practice,
    Stats,
    Accounts,
    DeleteAccount,
}

impl Kind {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "register" => Some(Self::Register),
            "practice" => Some(Self::Practice),
            "stats" => Some(Self::Stats),
            "accounts" => Some(Self::Accounts),
            "delete-account" => Some(Self::DeleteAccount),
            _ => None,
        }
    }

    fn accepts(self, flag: &str) -> bool {
        match flag {
            "--db" | "--bank" | "--email" | "--password" => true,
            "--username" | "--admin" | "--as-email" | "--as-password" => self == Self::Register,
            "--guest" | "--count" | "--module" | "--difficulty" | "--struggle" | "--resume"
            | "--new" => self == Self::Practice,
            "--id" => self == Self::DeleteAccount,
            _ => false,
        }
    }
}

#[derive(Default)]
struct Flags {
    db: Option<String>,
    bank: Option<PathBuf>,
    email: Option<String>,
    password: Option<String>,
    username: Option<String>,
    admin: bool,
    as_email: Option<String>,
    as_password: Option<String>,
    guest: bool,
    count: Option<u32>,
    modules: Vec<String>,
    difficulty: Option<DifficultyFilter>,
    struggle: bool,
    resume: bool,
    new: bool,
    id: Option<AccountId>,
}

impl Flags {
    fn parse(kind: Kind, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut flags = Self::default();
        while let Some(arg) = args.next() {
            if !kind.accepts(&arg) {
                return Err(ArgsError::UnknownArg(arg));
            }
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    flags.db = Some(value);
                }
                "--bank" => flags.bank = Some(require_value(args, "--bank")?.into()),
                "--email" => flags.email = Some(require_value(args, "--email")?),
                "--password" => flags.password = Some(require_value(args, "--password")?),
                "--username" => flags.username = Some(require_value(args, "--username")?),
                "--admin" => flags.admin = true,
                "--as-email" => flags.as_email = Some(require_value(args, "--as-email")?),
                "--as-password" => {
                    flags.as_password = Some(require_value(args, "--as-password")?);
                }
                "--guest" => flags.guest = true,
                "--count" => {
                    let value = require_value(args, "--count")?;
                    let parsed = value
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or(ArgsError::InvalidCount { raw: value.clone() })?;
                    flags.count = Some(parsed);
                }
                "--module" => flags.modules.push(require_value(args, "--module")?),
                "--difficulty" => {
                    let value = require_value(args, "--difficulty")?;
                    let parsed = value
                        .parse::<DifficultyFilter>()
                        .map_err(|_| ArgsError::InvalidDifficulty { raw: value.clone() })?;
                    flags.difficulty = Some(parsed);
                }
                "--struggle" => flags.struggle = true,
                "--resume" => flags.resume = true,
                "--new" => flags.new = true,
                "--id" => {
                    let value = require_value(args, "--id")?;
                    let parsed = value
                        .parse::<AccountId>()
                        .map_err(|_| ArgsError::InvalidAccountId { raw: value.clone() })?;
                    flags.id = Some(parsed);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(flags)
    }

    fn credentials(&mut self) -> Result<Credentials, ArgsError> {
        Ok(Credentials {
            email: self
                .email
                .take()
                .ok_or(ArgsError::MissingFlag { flag: "--email" })?,
            password: self
                .password
                .take()
                .ok_or(ArgsError::MissingFlag { flag: "--password" })?,
        })
    }

    fn actor(&mut self) -> Result<Option<Credentials>, ArgsError> {
        match (self.as_email.take(), self.as_password.take()) {
            (None, None) => Ok(None),
            (Some(email), Some(password)) => Ok(Some(Credentials { email, password })),
            (Some(_), None) => Err(ArgsError::MissingFlag {
                flag: "--as-password",
            }),
            (None, Some(_)) => Err(ArgsError::MissingFlag { flag: "--as-email" }),
        }
    }
}

impl Args {
    /// Parse everything after the program name. Flags override `config`.
    pub fn parse(
        argv: impl IntoIterator<Item = String>,
        config: &AppConfig,
    ) -> Result<Option<Self>, ArgsError> {
        let mut args = argv.into_iter();
        let Some(first) = args.next() else {
            return Ok(None);
        };
        if first == "--help" || first == "-h" || first == "help" {
            return Ok(None);
        }
        let kind = Kind::from_arg(&first).ok_or(ArgsError::UnknownArg(first))?;
        let mut flags = Flags::parse(kind, &mut args)?;

        let command = match kind {
            Kind::Register => {
                let Credentials { email, password } = flags.credentials()?;
                let actor = flags.actor()?;
                if actor.is_some() && !flags.admin {
                    return Err(ArgsError::MissingFlag { flag: "--admin" });
                }
                Command::Register {
                    email,
                    username: flags.username.take().unwrap_or_default(),
                    password,
                    admin: flags.admin,
                    actor,
                }
            }
            Kind::Practice => {
                let identity = if flags.guest {
                    if flags.email.is_some() {
                        return Err(ArgsError::Conflicting {
                            first: "--guest",
                            second: "--email",
                        });
                    }
                    Identity::Guest
                } else {
                    Identity::Account(flags.credentials()?)
                };
                let start = match (flags.resume, flags.new) {
                    (true, true) => {
                        return Err(ArgsError::Conflicting {
                            first: "--resume",
                            second: "--new",
                        });
                    }
                    (true, false) => StartMode::Resume,
                    (false, true) => StartMode::New,
                    (false, false) => StartMode::Ask,
                };
                Command::Practice(PracticeArgs {
                    identity,
                    count: flags.count,
                    modules: std::mem::take(&mut flags.modules),
                    difficulty: flags.difficulty.unwrap_or_default(),
                    struggle: flags.struggle,
                    start,
                })
            }
            Kind::Stats => Command::Stats(flags.credentials()?),
            Kind::Accounts => Command::Accounts(flags.credentials()?),
            Kind::DeleteAccount => Command::DeleteAccount {
                credentials: flags.credentials()?,
                id: flags.id.ok_or(ArgsError::MissingFlag { flag: "--id" })?,
            },
        };

        Ok(Some(Self {
            db_url: normalize_sqlite_url(flags.db.unwrap_or_else(|| config.db_url.clone())),
            bank: flags.bank.unwrap_or_else(|| config.question_bank.clone()),
            command,
        }))
    }
}

pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}
