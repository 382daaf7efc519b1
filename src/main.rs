use clap::Parser;
use harvest_processor::cli::{args::Args, commands};
use std::process;

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    // Create async runtime and run the main command logic
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(commands::run(args));

    match result {
        Ok(()) => {
            process::exit(0);
        }
        Err(error) => {
            // Render the full error chain before exiting non-zero
            eprintln!("Error: {:#}", anyhow::Error::new(error));
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("Harvest Processor - Regional Harvest-Failure Risk Prediction");
    println!("============================================================");
    println!();
    println!("Reconcile daily weather events with annual harvest yields, build");
    println!("model-ready feature sequences, and serve per-region failure-risk");
    println!("predictions from a persisted artifact bundle.");
    println!();
    println!("USAGE:");
    println!("    harvest-processor <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    train           Train the classifier and persist the artifact bundle");
    println!("    predict         Predict harvest-failure risk for one region");
    println!("    batch           Predict many regions, ranked by risk");
    println!("    prepare-annual  Convert the raw annual dataset into a processed CSV");
    println!("    regions         List the regions available in the harvest source");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Show help information");
    println!("    -V, --version    Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    # Train on local CSV sources:");
    println!("    harvest-processor train --weather data/cuaca.csv --harvest data/panen.csv");
    println!();
    println!("    # Predict one region:");
    println!("    harvest-processor predict --weather data/cuaca.csv --harvest data/panen.csv \\");
    println!("                              --region \"Kab. Bandung\"");
    println!();
    println!("    # Rank every known region by predicted risk:");
    println!("    harvest-processor batch --weather data/cuaca.csv --harvest data/panen.csv --all");
    println!();
    println!("For detailed help on any command, use:");
    println!("    harvest-processor <COMMAND> --help");
}
