use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Value, json};
use std::{fs, io::Write};
use tracing_subscriber::EnvFilter;
use vault_client::{CommandTable, RequestOptions, VaultClient, VaultClientBuilder};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let matches = build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let table = load_commands(matches.get_one::<String>("commands"))?;

    if let Some(sub) = matches.subcommand_matches("ops") {
        return handle_ops(&table, sub);
    }
    if let Some(sub) = matches.subcommand_matches("describe") {
        return handle_describe(&table, sub);
    }

    let mut defaults = RequestOptions::new();
    for (name, value) in parse_headers(matches.get_many::<String>("header")) {
        defaults = defaults.header(name, value);
    }
    let client = VaultClientBuilder::from_env()
        .request_options(defaults)
        .commands(table)
        .build()
        .context("build vault client")?;

    let pretty = matches.get_flag("pretty");
    let raw = matches.get_flag("raw");

    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("command required"))?;
    let body = match name {
        "call" => handle_call(&client, sub).await?,
        "read" => client.read(path_arg(sub)?, RequestOptions::new()).await?,
        "write" => {
            let data = load_json(sub.get_one::<String>("data"), sub.get_one::<String>("data-file"))?
                .unwrap_or(Value::Null);
            client.write(path_arg(sub)?, data, RequestOptions::new()).await?
        }
        "list" => client.list(path_arg(sub)?, RequestOptions::new()).await?,
        "delete" => client.delete(path_arg(sub)?, RequestOptions::new()).await?,
        "help" => client.help(path_arg(sub)?, RequestOptions::new()).await?,
        other => return Err(anyhow!("unknown command {other}")),
    };

    write_json_output(format_output(body, raw), pretty)
}

fn build_cli() -> Command {
    let path = || Arg::new("path").required(true).help("Vault path, e.g. secret/app");

    Command::new("vault")
        .about("Vault HTTP API client (command table driven)")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .disable_help_subcommand(true)
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Pretty-print JSON output"),
        )
        .arg(
            Arg::new("raw")
                .long("raw")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Return full API response instead of its data"),
        )
        .arg(
            Arg::new("header")
                .long("header")
                .global(true)
                .action(ArgAction::Append)
                .value_name("NAME:VALUE")
                .help("Add header (repeatable)"),
        )
        .arg(
            Arg::new("commands")
                .long("commands")
                .global(true)
                .value_name("PATH")
                .help("Command table file (JSON or YAML) instead of the bundled one"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log requests to stderr"),
        )
        .subcommand(
            Command::new("ops")
                .about("List available operations")
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("describe")
                .about("Describe an operation")
                .arg(Arg::new("name").required(true))
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("call")
                .about("Call an operation from the command table")
                .arg(Arg::new("name").required(true))
                .arg(
                    Arg::new("args")
                        .long("args")
                        .value_name("JSON")
                        .conflicts_with("args-file")
                        .help("Arguments object (body and path variables)"),
                )
                .arg(
                    Arg::new("args-file")
                        .long("args-file")
                        .value_name("PATH")
                        .conflicts_with("args")
                        .help("Read arguments object from file"),
                ),
        )
        .subcommand(Command::new("read").about("GET a path").arg(path()))
        .subcommand(
            Command::new("write")
                .about("PUT data to a path")
                .arg(path())
                .arg(
                    Arg::new("data")
                        .long("data")
                        .value_name("JSON")
                        .conflicts_with("data-file")
                        .help("JSON object to write"),
                )
                .arg(
                    Arg::new("data-file")
                        .long("data-file")
                        .value_name("PATH")
                        .conflicts_with("data")
                        .help("Read JSON object from file"),
                ),
        )
        .subcommand(Command::new("list").about("LIST keys under a path").arg(path()))
        .subcommand(Command::new("delete").about("DELETE a path").arg(path()))
        .subcommand(Command::new("help").about("Fetch API help for a path").arg(path()))
}

fn json_flag() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Emit machine-readable JSON")
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_commands(path: Option<&String>) -> Result<CommandTable> {
    let Some(path) = path else {
        return CommandTable::bundled().context("load bundled command table");
    };
    let raw = fs::read_to_string(path).with_context(|| format!("read command table {path}"))?;
    let table = if path.ends_with(".yaml") || path.ends_with(".yml") {
        CommandTable::from_yaml_str(&raw)
    } else {
        CommandTable::from_json_str(&raw)
    };
    table.with_context(|| format!("parse command table {path}"))
}

fn handle_ops(table: &CommandTable, matches: &ArgMatches) -> Result<()> {
    if matches.get_flag("json") {
        let out: Vec<Value> = table
            .iter()
            .map(|(name, desc)| json!({"name": name, "method": desc.method, "path": desc.path}))
            .collect();
        return write_stdout_line(&serde_json::to_string_pretty(&out)?);
    }

    for (name, desc) in table.iter() {
        write_stdout_line(&format!("{name} ({} {})", desc.method, desc.path))?;
    }
    Ok(())
}

fn handle_describe(table: &CommandTable, matches: &ArgMatches) -> Result<()> {
    let name = matches
        .get_one::<String>("name")
        .ok_or_else(|| anyhow!("operation required"))?;
    let desc = table
        .get(name)
        .ok_or_else(|| anyhow!("unknown command {name}"))?;

    if matches.get_flag("json") {
        return write_stdout_line(&serde_json::to_string_pretty(desc)?);
    }

    write_stdout_line(&format!("{} {}", desc.method, desc.path))?;
    if let Some(schema) = desc.validation.body_schema() {
        write_stdout_line(&format!("body: {}", serde_json::to_string(schema)?))?;
    }
    if let Some(schema) = desc.validation.query_schema() {
        write_stdout_line(&format!("query: {}", serde_json::to_string(schema)?))?;
    }
    Ok(())
}

async fn handle_call(client: &VaultClient, matches: &ArgMatches) -> Result<Value> {
    let name = matches
        .get_one::<String>("name")
        .ok_or_else(|| anyhow!("operation required"))?;
    let args = load_json(matches.get_one::<String>("args"), matches.get_one::<String>("args-file"))?
        .unwrap_or_else(|| json!({}));
    Ok(client.invoke(name, args).await?)
}

fn path_arg(matches: &ArgMatches) -> Result<&str> {
    matches
        .get_one::<String>("path")
        .map(String::as_str)
        .ok_or_else(|| anyhow!("path required"))
}

fn load_json(inline: Option<&String>, file: Option<&String>) -> Result<Option<Value>> {
    if let Some(raw) = inline {
        let value = serde_json::from_str(raw).context("invalid JSON argument")?;
        return Ok(Some(value));
    }
    if let Some(path) = file {
        let raw = fs::read_to_string(path).with_context(|| format!("read JSON file {path}"))?;
        let value = serde_json::from_str(&raw).context("invalid JSON file")?;
        return Ok(Some(value));
    }
    Ok(None)
}

fn parse_headers(values: Option<clap::parser::ValuesRef<String>>) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    if let Some(values) = values {
        for value in values {
            if let Some((k, v)) = split_key_value(value) {
                headers.push((k.trim().to_string(), v.trim().to_string()));
            }
        }
    }
    headers
}

fn split_key_value(value: &str) -> Option<(&str, &str)> {
    if let Some((k, v)) = value.split_once(':') {
        return Some((k, v));
    }
    value.split_once('=')
}

fn format_output(body: Value, raw: bool) -> Value {
    if raw {
        return body;
    }
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.shift_remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn write_json_output(value: Value, pretty: bool) -> Result<()> {
    if pretty {
        write_stdout_line(&serde_json::to_string_pretty(&value)?)
    } else {
        write_stdout_line(&serde_json::to_string(&value)?)
    }
}

fn write_stdout_line(line: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(line.as_bytes())?;
    stdout.write_all(b"\n")?;
    Ok(())
}
