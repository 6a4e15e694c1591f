use chrono::TimeZone;
use spendnorm_core::TriggerSource;

use super::*;

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["spendnorm-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_db_migrate_command() {
    let cli = Cli::try_parse_from(["spendnorm-cli", "db", "migrate"])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn plain_run_has_no_overrides() {
    let cli = Cli::try_parse_from(["spendnorm-cli", "run"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Run {
            account: None,
            from: None,
            to: None
        })
    ));
}

#[test]
fn run_parses_replay_window() {
    let cli = Cli::try_parse_from([
        "spendnorm-cli",
        "run",
        "--account",
        "42",
        "--from",
        "2024-03-10T00:00:00Z",
        "--to",
        "2024-03-11T00:00:00Z",
    ])
    .unwrap();

    let Some(Commands::Run { account, from, to }) = cli.command else {
        panic!("expected run command");
    };
    assert_eq!(account.as_deref(), Some("42"));
    assert_eq!(from, Some(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()));
    assert_eq!(to, Some(Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap()));
}

#[test]
fn run_from_without_to_is_rejected() {
    let result = Cli::try_parse_from(["spendnorm-cli", "run", "--from", "2024-03-10T00:00:00Z"]);
    assert!(result.is_err());
}

#[test]
fn runs_list_defaults_limit() {
    let cli = Cli::try_parse_from(["spendnorm-cli", "runs", "list"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Runs {
            command: RunsCommands::List { limit: 20 }
        })
    ));
}

#[test]
fn rates_get_parses_currency_and_date() {
    let cli = Cli::try_parse_from([
        "spendnorm-cli",
        "rates",
        "get",
        "--currency",
        "JPY",
        "--date",
        "2024-03-10",
    ])
    .unwrap();

    let Some(Commands::Rates {
        command: rates::RatesCommands::Get { currency, date },
    }) = cli.command
    else {
        panic!("expected rates get");
    };
    assert_eq!(currency, "JPY");
    assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
}

#[test]
fn rates_warm_rejects_bad_date() {
    let result = Cli::try_parse_from(["spendnorm-cli", "rates", "warm", "--date", "03/10/2024"]);
    assert!(result.is_err());
}

#[test]
fn rates_warm_date_is_optional() {
    let cli = Cli::try_parse_from(["spendnorm-cli", "rates", "warm"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Rates {
            command: rates::RatesCommands::Warm { date: None }
        })
    ));
}

#[test]
fn request_without_overrides_advances_boundary() {
    let request = run::build_request(None, None);
    assert_eq!(request.trigger, TriggerSource::Cli);
    assert!(request.advances_boundary());
}

#[test]
fn request_with_account_is_a_replay() {
    let request = run::build_request(None, Some("42".to_owned()));
    assert_eq!(request.trigger, TriggerSource::Replay);
    assert!(!request.advances_boundary());
}
