use std::error::Error;
use std::io::Write;

use prep_core::model::{
    AccountId, DEFAULT_QUESTION_COUNT, OptionKey, Question, QuestionBank, TestConfig, TestResult,
};
use services::sessions::{AnswerFeedback, ResumeOffer};
use services::{
    AdvanceStep, AppServices, CheckpointStatus, CommitStatus, PracticeSession, SessionEntry,
    SessionError, SessionState, SubmitOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::cli::{PracticeArgs, StartMode};

/// Line-oriented prompt over stdin/stdout.
pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Print `text` and read one trimmed line; `None` at end of input.
    pub async fn prompt(&mut self, text: &str) -> std::io::Result<Option<String>> {
        print!("{text}");
        std::io::stdout().flush()?;
        Ok(self
            .lines
            .next_line()
            .await?
            .map(|line| line.trim().to_owned()))
    }
}

/// Run one interactive practice session for `account`.
pub async fn run_practice(
    services: &AppServices,
    account: AccountId,
    is_guest: bool,
    bank: &QuestionBank,
    args: &PracticeArgs,
    console: &mut Console,
) -> Result<(), Box<dyn Error>> {
    let config = build_config(bank, args)?;
    let Some(mut session) = open_session(services, account, bank, config, args, console).await?
    else {
        return Ok(());
    };

    let loop_svc = services.session_loop();
    let mut shown: Option<usize> = None;

    loop {
        match session.state() {
            SessionState::AwaitingAnswer(index) => {
                if shown != Some(index) {
                    print_question(&session, index);
                    shown = Some(index);
                }
                let Some(input) = console
                    .prompt("Your answer (s = save & exit, q = quit): ")
                    .await?
                else {
                    return save_and_exit(services, account, is_guest, &mut session).await;
                };
                match input.as_str() {
                    "s" | "S" => {
                        return save_and_exit(services, account, is_guest, &mut session).await;
                    }
                    "q" | "Q" => return quit(services, account, &mut session).await,
                    raw => {
                        let Ok(key) = raw.parse::<OptionKey>() else {
                            println!("Type one of the option keys shown above.");
                            continue;
                        };
                        match loop_svc.submit_answer(account, &mut session, &key).await {
                            Ok(step) => {
                                if let SubmitOutcome::Recorded(feedback) = &step.outcome {
                                    print_feedback(feedback, session.current_question());
                                }
                                report_checkpoint(step.checkpoint);
                            }
                            Err(SessionError::UnknownOption { key, .. }) => {
                                println!("{key} is not an option for this question.");
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
            }
            SessionState::Answered(index) => {
                if shown != Some(index) {
                    print_question(&session, index);
                    if let Some(answer) = session.current_answer() {
                        println!("You answered {answer}.");
                    }
                    shown = Some(index);
                }
                let Some(input) = console
                    .prompt("Enter = continue, s = save & exit, q = quit: ")
                    .await?
                else {
                    return save_and_exit(services, account, is_guest, &mut session).await;
                };
                match input.as_str() {
                    "" => match loop_svc.advance(account, &mut session).await? {
                        AdvanceStep::Next { checkpoint, .. } => report_checkpoint(checkpoint),
                        AdvanceStep::Finished { result, commit } => {
                            print_result(&result);
                            if commit == CommitStatus::Pending {
                                retry_commit(services, account, &mut session).await;
                            }
                            return Ok(());
                        }
                    },
                    "s" | "S" => {
                        return save_and_exit(services, account, is_guest, &mut session).await;
                    }
                    "q" | "Q" => return quit(services, account, &mut session).await,
                    _ => println!("Press Enter to continue."),
                }
            }
            SessionState::Completed | SessionState::Abandoned => return Ok(()),
        }
    }
}

fn build_config(
    bank: &QuestionBank,
    args: &PracticeArgs,
) -> Result<TestConfig, prep_core::Error> {
    let count = args.count.unwrap_or(DEFAULT_QUESTION_COUNT);
    let known = bank.modules();
    for module in &args.modules {
        if !known.contains(module.trim()) {
            println!("Note: no questions belong to module \"{module}\".");
        }
    }
    let config = if args.modules.is_empty() {
        TestConfig::new(count, known, args.difficulty, args.struggle)?
    } else {
        TestConfig::new(count, args.modules.iter().cloned(), args.difficulty, args.struggle)?
    };
    Ok(config)
}

async fn open_session(
    services: &AppServices,
    account: AccountId,
    bank: &QuestionBank,
    config: TestConfig,
    args: &PracticeArgs,
    console: &mut Console,
) -> Result<Option<PracticeSession>, Box<dyn Error>> {
    let resume = services.resume();
    let entry = resume.entry(account).await?;

    let resume_now = match (&entry, args.start) {
        (SessionEntry::Resumable(_), StartMode::Resume) => true,
        (SessionEntry::Resumable(offer), StartMode::Ask) => {
            let answer = console.prompt(&resume_question(offer)).await?;
            matches!(answer.as_deref(), None | Some("" | "y" | "Y" | "yes"))
        }
        (SessionEntry::Unrecoverable { reason, .. }, _) => {
            println!("The saved session could not be restored ({reason}); starting a new one.");
            false
        }
        (SessionEntry::Fresh, StartMode::Resume) => {
            println!("No saved session found; starting a new one.");
            false
        }
        _ => false,
    };
    if resume_now {
        return Ok(Some(resume.resume(account).await?));
    }

    let started = resume
        .start_new(
            account,
            bank,
            config,
            entry.stored_session(),
            &mut rand::rng(),
        )
        .await;
    match started {
        Ok(session) => {
            println!(
                "Starting a practice test of {} questions.",
                session.total_questions()
            );
            Ok(Some(session))
        }
        Err(SessionError::Build(e)) if e.is_positive() => {
            println!("No incorrect questions found in your history! Great job!");
            Ok(None)
        }
        Err(SessionError::Build(_)) => {
            println!(
                "No questions match your criteria. Try selecting more modules or a different difficulty."
            );
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn resume_question(offer: &ResumeOffer) -> String {
    format!(
        "Resume your saved test at question {} of {} (score {})? [Y/n] ",
        offer.position, offer.total, offer.score
    )
}

fn print_question(session: &PracticeSession, index: usize) {
    let Some(question) = session.questions().get(index) else {
        return;
    };
    let progress = session.progress();
    println!();
    println!(
        "Question {} of {}  [{} / {}]  {}% answered, score {}",
        index + 1,
        progress.total,
        question.module(),
        question.difficulty(),
        progress.answered_percent(),
        progress.score
    );
    println!("{}", question.text());
    print_options(question);
}

fn print_options(question: &Question) {
    for (key, text) in question.options() {
        println!("  {key}) {text}");
    }
}

fn print_feedback(feedback: &AnswerFeedback, question: Option<&Question>) {
    let key = &feedback.correct_answer;
    if feedback.is_correct {
        println!("Correct!");
    } else if let Some(text) = question.and_then(|q| q.option(key)) {
        println!("Incorrect. The correct answer is {key}) {text}.");
    } else {
        println!("Incorrect. The correct answer is {key}.");
    }
    if !feedback.explanation.is_empty() {
        println!("{}", feedback.explanation);
    }
}

fn print_result(result: &TestResult) {
    println!();
    println!(
        "Test complete: {}/{} ({}%) {}",
        result.score(),
        result.total_questions(),
        result.rounded_percent(),
        if result.passed() { "PASSED" } else { "keep practicing" }
    );
}

fn report_checkpoint(status: CheckpointStatus) {
    match status {
        CheckpointStatus::Deferred => {
            println!("(progress could not be saved right now; it will be retried)");
        }
        CheckpointStatus::Superseded => {
            println!("(another session replaced this one; progress is no longer saved)");
        }
        CheckpointStatus::Saved | CheckpointStatus::Stale | CheckpointStatus::Unchanged => {}
    }
}

async fn save_and_exit(
    services: &AppServices,
    account: AccountId,
    is_guest: bool,
    session: &mut PracticeSession,
) -> Result<(), Box<dyn Error>> {
    let status = services
        .session_loop()
        .exit_with_save(account, session)
        .await?;
    match status {
        CheckpointStatus::Saved | CheckpointStatus::Unchanged if is_guest => {
            println!(
                "Progress saved for this run only; guest sessions end when the program exits."
            );
        }
        CheckpointStatus::Saved | CheckpointStatus::Unchanged => {
            println!("Progress saved. Continue later with `practice --resume`.");
        }
        CheckpointStatus::Stale => println!("A newer save of this test already exists."),
        CheckpointStatus::Superseded => println!("Another test has replaced this one."),
        CheckpointStatus::Deferred => println!("Progress could not be saved."),
    }
    Ok(())
}

async fn quit(
    services: &AppServices,
    account: AccountId,
    session: &mut PracticeSession,
) -> Result<(), Box<dyn Error>> {
    services.session_loop().abandon(account, session).await?;
    println!("Test abandoned; nothing was recorded.");
    Ok(())
}

async fn retry_commit(services: &AppServices, account: AccountId, session: &mut PracticeSession) {
    match services
        .session_loop()
        .finalize_result(account, session)
        .await
    {
        Ok(_) => println!("Result saved."),
        Err(e) => println!("Your result could not be saved: {e}"),
    }
}
