use clap::{arg, command, value_parser, ArgAction};
use log::{error, info};
use optimus::io::{format_assignment, simple};
use optimus::optimizer::score;
use optimus::{Optimizer, OptimizerError, SolverConfig};
use std::time::Duration;

fn main() {
    env_logger::init();

    let args = command!()
        .arg(arg!(<INPUT> "Input file with groups and preferences in simple JSON format"))
        .arg(
            arg!(-o --outfile <FILE> "Write the resulting assignment to this file (JSON)")
                .required(false),
        )
        .arg(
            arg!(-s --solver <PROGRAM> "LP solver executable, reading the model from stdin")
                .default_value("lp_solve"),
        )
        .arg(
            arg!(-a --"solver-arg" <ARG> "Argument to pass to the solver (repeatable). Defaults to -S3")
                .required(false)
                .action(ArgAction::Append)
                .allow_hyphen_values(true),
        )
        .arg(
            arg!(-t --timeout <SECONDS> "Kill the solver after this number of seconds")
                .required(false)
                .value_parser(value_parser!(u64)),
        )
        .arg(arg!(-p --print "Print the assignment to stdout, even if an outfile is given"))
        .get_matches();

    // Read input
    let input_path = args
        .get_one::<String>("INPUT")
        .expect("INPUT is a required argument");
    let file = match std::fs::File::open(input_path) {
        Ok(file) => file,
        Err(e) => {
            error!("Could not open input file {}: {}", input_path, e);
            std::process::exit(exitcode::NOINPUT)
        }
    };
    let problem = match simple::read(std::io::BufReader::new(file)) {
        Ok(problem) => problem,
        Err(e) => {
            error!("Could not read input file: {}", e);
            std::process::exit(exitcode::DATAERR)
        }
    };
    info!(
        "Read {} groups and {} users",
        problem.groups.len(),
        problem.group_preferences.len()
    );

    // Solve
    let solver = args
        .get_one::<String>("solver")
        .expect("solver has a default value");
    let solver_args: Vec<String> = match args.get_many::<String>("solver-arg") {
        Some(values) => values.cloned().collect(),
        None => SolverConfig::default().args,
    };
    let mut config = SolverConfig::new(solver.as_str()).with_args(solver_args);
    if let Some(seconds) = args.get_one::<u64>("timeout") {
        config = config.with_timeout(Duration::from_secs(*seconds));
    }
    let optimizer = Optimizer::new(config);
    let assignment = match optimizer.calculate_assignment(
        &problem.groups,
        &problem.group_preferences,
        &problem.team_preferences,
    ) {
        Ok(assignment) => assignment,
        Err(e) => {
            error!("Group assignment failed: {}", e);
            std::process::exit(exit_code(&e))
        }
    };

    info!(
        "Found assignment with penalty {} (average preference weight {:.2}, {} broken friendships)",
        score::assignment_penalty(
            &assignment,
            &problem.group_preferences,
            &problem.team_preferences
        ),
        score::assignment_quality(&assignment, &problem.group_preferences),
        score::broken_friendships(&assignment, &problem.team_preferences).len()
    );

    // Write output
    let outfile = args.get_one::<String>("outfile");
    if args.get_flag("print") || outfile.is_none() {
        print!("{}", format_assignment(&assignment, &problem.groups));
    }
    if let Some(path) = outfile {
        let file = match std::fs::File::create(path) {
            Ok(file) => file,
            Err(e) => {
                error!("Could not create output file {}: {}", path, e);
                std::process::exit(exitcode::CANTCREAT)
            }
        };
        if let Err(e) = simple::write(std::io::BufWriter::new(file), &assignment) {
            error!("Could not write output file {}: {}", path, e);
            std::process::exit(exitcode::IOERR)
        }
        info!("Assignment written to {}", path);
    }
}

/// Map the optimizer's errors to the process exit code
fn exit_code(error: &OptimizerError) -> exitcode::ExitCode {
    match error {
        OptimizerError::DuplicateGroup(_)
        | OptimizerError::UnknownGroup(_)
        | OptimizerError::NoGroups
        | OptimizerError::UnknownUser(_)
        | OptimizerError::UnknownFriend { .. }
        | OptimizerError::DuplicateFriend { .. } => exitcode::DATAERR,
        OptimizerError::Launch { .. } => exitcode::UNAVAILABLE,
        OptimizerError::Timeout(_) => exitcode::TEMPFAIL,
        _ => exitcode::SOFTWARE,
    }
}
