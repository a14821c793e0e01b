//! Line-oriented command interface for the vaccine scheduler.
//!
//! Reads one command per line from standard input and drives the reservation
//! coordinator. With `DATABASE_URL` set (also read from `.env`), the
//! PostgreSQL store is used; otherwise an in-memory store backs the session.

mod commands;
mod directory;

use anyhow::Result;
use commands::{Command, Repl, parse};
use std::io::{BufRead, Write};
use tracing_subscriber::EnvFilter;
use vaxsched_core::ReservationStore;
use vaxsched_postgres::PostgresStore;
use vaxsched_testing::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            tracing::info!("using the PostgreSQL store");
            let store = PostgresStore::connect(&url).await?;
            store.migrate().await?;
            run(store).await
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set, using the in-memory store");
            run(MemoryStore::new()).await
        }
    }
}

fn print_greeting() {
    println!();
    println!("Welcome to the Vaccine Reservation Scheduling Application!");
    println!("*** Please enter one of the following commands ***");
    println!("> create_patient <username>");
    println!("> create_caregiver <username>");
    println!("> login_patient <username>");
    println!("> login_caregiver <username>");
    println!("> search_caregiver_schedule <date>");
    println!("> reserve <date> <vaccine>");
    println!("> upload_availability <date>");
    println!("> cancel <appointment_id>");
    println!("> add_doses <vaccine> <number>");
    println!("> show_appointments");
    println!("> logout");
    println!("> quit");
    println!();
}

async fn run<S: ReservationStore>(store: S) -> Result<()> {
    print_greeting();
    let mut repl = Repl::new(store);
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        match parse(&line?) {
            Ok(Command::Quit) => {
                println!("Bye!");
                break;
            }
            Ok(command) => {
                for output in repl.execute(command).await {
                    println!("{output}");
                }
            }
            Err(err) => println!("{err}"),
        }
    }
    Ok(())
}
