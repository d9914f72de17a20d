//! `database-query` provider backed by `sqlcmd`
//!
//! Connection parameters: `host` (default `localhost`), `instance`, `port`,
//! `user`, `password`, `db_name`. Without a `user` the connection uses
//! integrated authentication. Every cell is returned as text, `NULL` as null.

use stig_engine::strategies::{
    handle_as, string_parameter, ProbeError, ProbeParameters, ProviderHandle, ResourceProvider,
    SystemCommandExecutor,
};
use stig_engine::types::{ProbeValue, Table};

pub const DATABASE_QUERY: &str = "database-query";

const SQLCMD: &str = "sqlcmd";
const COLUMN_SEPARATOR: char = '|';

/// Resolved sqlcmd target for one set of connection parameters
#[derive(Debug, Clone)]
pub struct SqlConnection {
    pub server: String,
    pub user: Option<String>,
    pub database: Option<String>,
    executor: SystemCommandExecutor,
}

impl SqlConnection {
    fn arguments(&self, query: &str) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            self.server.clone(),
            "-b".to_string(),
            "-W".to_string(),
            "-s".to_string(),
            COLUMN_SEPARATOR.to_string(),
        ];
        match &self.user {
            Some(user) => args.extend(["-U".to_string(), user.clone()]),
            None => args.push("-E".to_string()),
        }
        if let Some(database) = &self.database {
            args.extend(["-d".to_string(), database.clone()]);
        }
        args.extend(["-Q".to_string(), format!("SET NOCOUNT ON; {}", query.trim())]);
        args
    }
}

pub struct SqlCmdProvider {
    executor: SystemCommandExecutor,
}

impl SqlCmdProvider {
    pub fn new(executor: SystemCommandExecutor) -> Self {
        Self { executor }
    }
}

impl ResourceProvider for SqlCmdProvider {
    fn kind(&self) -> &str {
        DATABASE_QUERY
    }

    fn connect(&self, parameters: &ProbeParameters) -> Result<ProviderHandle, ProbeError> {
        let mut server = string_parameter(parameters, "host").unwrap_or_else(|| "localhost".to_string());
        if let Some(instance) = string_parameter(parameters, "instance") {
            server = format!("{}\\{}", server, instance);
        }
        if let Some(port) = string_parameter(parameters, "port") {
            if port.parse::<u16>().is_err() {
                return Err(ProbeError::invalid_parameters(
                    DATABASE_QUERY,
                    format!("port '{}' is not a valid TCP port", port),
                ));
            }
            server = format!("{},{}", server, port);
        }

        let user = string_parameter(parameters, "user");
        let mut executor = self.executor.clone();
        if user.is_some() {
            if let Some(password) = string_parameter(parameters, "password") {
                executor = executor.with_env("SQLCMDPASSWORD", password);
            }
        }

        Ok(std::sync::Arc::new(SqlConnection {
            server,
            user,
            database: string_parameter(parameters, "db_name"),
            executor,
        }))
    }

    fn fetch(&self, handle: &ProviderHandle, query: &str) -> Result<ProbeValue, ProbeError> {
        let connection = handle_as::<SqlConnection>(handle, DATABASE_QUERY)?;
        let args = connection.arguments(query);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = connection
            .executor
            .execute(SQLCMD, &arg_refs, None)
            .map_err(|e| e.into_probe_error(DATABASE_QUERY, query))?;

        if !output.success() {
            return Err(classify_failure(query, &output.stdout, &output.stderr));
        }
        parse_table(&output.stdout, COLUMN_SEPARATOR)
            .map(ProbeValue::Table)
            .map_err(|reason| ProbeError::query_failed(DATABASE_QUERY, query, reason))
    }

    fn describe(&self) -> String {
        "SQL Server queries through sqlcmd".to_string()
    }
}

/// Map sqlcmd error text onto the probe error taxonomy
pub fn classify_failure(query: &str, stdout: &str, stderr: &str) -> ProbeError {
    let text = format!("{}\n{}", stderr, stdout);
    let lower = text.to_lowercase();
    let reason = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("sqlcmd exited with an error")
        .to_string();

    if lower.contains("login failed") || lower.contains("permission was denied") {
        ProbeError::AccessDenied {
            kind: DATABASE_QUERY.to_string(),
            reason,
        }
    } else if lower.contains("login timeout expired")
        || lower.contains("network-related")
        || lower.contains("tcp provider")
        || lower.contains("named pipes provider")
    {
        ProbeError::unavailable(DATABASE_QUERY, reason)
    } else {
        ProbeError::query_failed(DATABASE_QUERY, query, reason)
    }
}

/// Parse `sqlcmd -W -s <sep>` output: header, dash rule, rows
pub fn parse_table(output: &str, separator: char) -> Result<Table, String> {
    let mut lines = output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .skip_while(|line| line.trim().is_empty())
        .peekable();

    let header = match lines.next() {
        Some(header) => header,
        None => return Ok(Table::default()),
    };
    let columns: Vec<String> = header.split(separator).map(|c| c.trim().to_string()).collect();
    let mut table = Table::new(columns);

    let is_rule = |line: &str| !line.is_empty() && line.chars().all(|c| c == '-' || c == separator);
    lines.next_if(|line| is_rule(*line));

    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        let row: Vec<ProbeValue> = line
            .split(separator)
            .map(|cell| match cell.trim() {
                "NULL" => ProbeValue::Null,
                text => ProbeValue::from(text),
            })
            .collect();
        if row.len() != table.columns.len() {
            return Err(format!(
                "row has {} cells but the result has {} columns",
                row.len(),
                table.columns.len()
            ));
        }
        table.push_row(row);
    }
    Ok(table)
}
