use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use abacus::orchestrator::Orchestrator;
use abacus::session::Session;
use abacus::tracing::init_tracing;
use abacus::{Config, PyKernel, TurnEvent, TurnInput};

const HELP: &str = "\
Commands:
  /upload <path>   copy a file into the session and tell the coder about it
  /code <path>     execute the file's contents directly, skipping generation
  /save            persist transcripts and session state
  /notebook        export the execution history as notebook.ipynb
  /report          generate a markdown analysis report
  /clear           reset the session: fresh kernel, empty transcripts
  /help            show this help
  /quit            save and exit
Anything else is sent to the coder as a request.";

#[tokio::main]
async fn main() {
    if let Err(e) = init_tracing() {
        eprintln!("failed to initialize tracing: {}", e);
    }

    let mut config = Config::from_env();
    let mut upload: Option<PathBuf> = None;
    let mut resume: Option<PathBuf> = None;
    let mut message_parts: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-f" | "--file" => upload = args.next().map(PathBuf::from),
            "-r" | "--resume" => resume = args.next().map(PathBuf::from),
            "-c" | "--config" => {
                if let Some(path) = args.next() {
                    match Config::load(Path::new(&path)) {
                        Ok(loaded) => config = loaded,
                        Err(e) => {
                            eprintln!("failed to load config {}: {}", path, e);
                            std::process::exit(1);
                        }
                    }
                }
            }
            "-h" | "--help" => {
                println!("usage: abacus [-c config.json] [-r cache-dir] [-f file] [message]");
                println!("{}", HELP);
                return;
            }
            _ => message_parts.push(arg),
        }
    }

    let opened = match resume {
        Some(dir) => Session::resume(&dir).await,
        None => Session::open(config).await,
    };
    let mut session = match opened {
        Ok(session) => session,
        Err(e) => {
            eprintln!("failed to open session: {}", e);
            std::process::exit(1);
        }
    };
    println!("Session cache: {}", session.cache_dir.display());

    let mut orchestrator = Orchestrator::from_config(&session.config);
    if session.config.retrieval {
        let registry = abacus::knowledge::bundled();
        session.prime_knowledge(&registry).await;
        orchestrator = orchestrator.with_knowledge(registry);
    }

    if let Some(path) = upload {
        match session.add_file(&path) {
            Ok(dest) => println!("Uploaded {}", dest.display()),
            Err(e) => eprintln!("upload failed: {}", e),
        }
    }

    // Single-message mode: run one turn and exit.
    if !message_parts.is_empty() {
        let message = message_parts.join(" ");
        run_turn(&orchestrator, &mut session, TurnInput::Message(message)).await;
        if let Err(e) = session.save() {
            eprintln!("save failed: {}", e);
        }
        session.close().await;
        return;
    }

    println!("Type a request, or /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').map_or((line, ""), |(c, r)| (c, r.trim())) {
            ("/quit", _) | ("/exit", _) => break,
            ("/help", _) => println!("{}", HELP),
            ("/upload", path) => match session.add_file(Path::new(path)) {
                Ok(dest) => println!("Uploaded {}", dest.display()),
                Err(e) => eprintln!("upload failed: {}", e),
            },
            ("/code", path) => match std::fs::read_to_string(path) {
                Ok(code) => {
                    run_turn(&orchestrator, &mut session, TurnInput::CodeOverride(code)).await
                }
                Err(e) => eprintln!("could not read {}: {}", path, e),
            },
            ("/save", _) => match session.save() {
                Ok(()) => println!("Saved to {}", session.cache_dir.display()),
                Err(e) => eprintln!("save failed: {}", e),
            },
            ("/notebook", _) => match session.export_notebook() {
                Ok(path) => println!("Notebook written to {}", path.display()),
                Err(e) => eprintln!("notebook export failed: {}", e),
            },
            ("/report", _) => match orchestrator.generate_report(&session).await {
                Ok(path) => println!("Report written to {}", path.display()),
                Err(e) => eprintln!("report failed: {}", e),
            },
            ("/clear", _) => match session.clear().await {
                Ok(()) => {
                    // The fresh kernel needs its backend functions back.
                    if let Some(registry) = orchestrator.knowledge() {
                        session.prime_knowledge(registry).await;
                    }
                    println!("Session cleared.");
                }
                Err(e) => eprintln!("clear failed: {}", e),
            },
            _ => run_turn(&orchestrator, &mut session, TurnInput::Message(line.to_string())).await,
        }
    }

    if let Err(e) = session.save() {
        eprintln!("save failed: {}", e);
    }
    session.close().await;
    println!("Bye.");
}

/// Run one turn, printing events as they stream in
async fn run_turn(
    orchestrator: &Orchestrator,
    session: &mut Session<PyKernel>,
    input: TurnInput,
) {
    let (tx, mut rx) = mpsc::channel::<TurnEvent>(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                TurnEvent::Token(token) => {
                    print!("{}", token);
                    let _ = std::io::stdout().flush();
                }
                TurnEvent::Notice(notice) => {
                    print!("{}", notice);
                    let _ = std::io::stdout().flush();
                }
                TurnEvent::Artifact(artifact) => println!("{}", artifact.render()),
                TurnEvent::Done(_) => break,
            }
        }
    });

    orchestrator.run_turn(session, input, &tx).await;
    drop(tx);
    let _ = printer.await;
    println!();
}
