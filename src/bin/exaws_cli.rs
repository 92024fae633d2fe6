use std::{error::Error, io};

use clap::Parser;
use exaws::{
    Command, ConnConfig, Connection, prompt,
    connection::{DEFAULT_FETCH_BYTES, DEFAULT_PORT},
    protocol::StatementResult,
};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Database host
    #[arg(long, env = "EXAWS_HOST", default_value = "127.0.0.1")]
    host: String,
    /// WebSocket port
    #[arg(long, env = "EXAWS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Access token used to log in
    #[arg(long, env = "EXAWS_ACCESS_TOKEN")]
    token: Option<String>,
    /// Maximum bytes requested per result chunk
    #[arg(long, default_value_t = DEFAULT_FETCH_BYTES)]
    fetch_bytes: u64,
    /// Start with autocommit off
    #[arg(long)]
    no_autocommit: bool,
    /// Do not log failed requests
    #[arg(long)]
    suppress_error: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let conf = ConnConfig {
        host: cli.host,
        port: cli.port,
        access_token: cli.token,
        autocommit: !cli.no_autocommit,
        fetch_bytes: cli.fetch_bytes,
        suppress_error: cli.suppress_error,
        ..ConnConfig::default()
    };
    let mut conn = Connection::connect(conf)?;

    loop {
        let cmd = match prompt(io::stdin().lock(), io::stdout().lock()) {
            Ok(c) => c,
            Err(e) if e.is_fatal() => {
                eprintln!("{e}");
                break;
            }
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let res = match cmd {
            Command::Exit => break,
            Command::Empty => Ok(()),
            Command::Commit => conn.commit(),
            Command::Rollback => conn.rollback(),
            Command::Quote(ident) => conn.quote_ident(&ident).map(|q| println!("{q}")),
            Command::Sql(sql) => run(&mut conn, &sql),
        };
        if let Err(e) = res {
            eprintln!("error: {e}");
        }
    }

    conn.disconnect()?;
    Ok(())
}

fn run(conn: &mut Connection, sql: &str) -> Result<(), exaws::ClientError> {
    let result_set = match conn.execute(sql)? {
        StatementResult::RowCount { row_count } => {
            println!("{row_count} rows affected");
            return Ok(());
        }
        StatementResult::ResultSet { result_set } => result_set,
    };

    let mut rows = 0;
    for row in conn.result_rows(result_set)? {
        let line: Vec<String> = row?.iter().map(format_value).collect();
        println!("{}", line.join("\t"));
        rows += 1;
    }
    println!("({rows} rows)");
    Ok(())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::from("NULL"),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
