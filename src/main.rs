use std::io::Write;

use sickle::loader::{load_document, load_document_concurrent};

const USAGE: &str = "Usage: sickle [--concurrent] [--workers N] [--images] <path>";

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut concurrent = false;
    let mut workers = 0usize;
    let mut images = false;
    let mut path: Option<String> = None;

    let mut i = 0usize;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--concurrent" => concurrent = true,
            "--images" => images = true,
            "--workers" => {
                if i + 1 >= args.len() {
                    eprintln!("missing value for --workers");
                    std::process::exit(2);
                }
                workers = parse_workers(&args[i + 1]);
                i += 1;
            }
            _ if arg.starts_with("--workers=") => {
                workers = parse_workers(&arg["--workers=".len()..]);
            }
            other if other.starts_with("--") => {
                eprintln!("unknown flag {}\n{}", other, USAGE);
                std::process::exit(2);
            }
            other => path = Some(other.to_string()),
        }
        i += 1;
    }

    let Some(path) = path else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let result = if concurrent {
        load_document_concurrent(&path, workers, images)
    } else {
        load_document(&path, images)
    };

    let doc = match result {
        Ok(doc) => doc,
        Err(err) => {
            eprintln!("failed to load {}: {}", path, err);
            std::process::exit(1);
        }
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(err) = serde_json::to_writer_pretty(&mut stdout, &doc) {
        eprintln!("failed to encode output: {}", err);
        std::process::exit(1);
    }
    let _ = stdout.write_all(b"\n");
}

fn parse_workers(value: &str) -> usize {
    match value.parse() {
        Ok(workers) => workers,
        Err(_) => {
            eprintln!("invalid --workers value {:?}", value);
            std::process::exit(2);
        }
    }
}
