//! `os-service` provider
//!
//! The query is a service name. The result is a single-row table with
//! columns `name`, `installed`, `running` and `enabled`. Windows hosts are
//! inspected with `sc`, Linux hosts with `systemctl`.

use std::sync::Arc;
use stig_engine::strategies::{
    ProbeError, ProbeParameters, ProviderHandle, ResourceProvider, SystemCommandExecutor,
};
use stig_engine::types::{ProbeValue, Table};

pub const OS_SERVICE: &str = "os-service";

/// `sc` exit code for an unknown service name
const SC_SERVICE_DOES_NOT_EXIST: i32 = 1060;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManager {
    WindowsSc,
    Systemd,
}

impl ServiceManager {
    pub fn for_host() -> Self {
        if cfg!(windows) {
            ServiceManager::WindowsSc
        } else {
            ServiceManager::Systemd
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceState {
    pub installed: bool,
    pub running: bool,
    pub enabled: bool,
}

impl ServiceState {
    fn into_table(self, name: &str) -> Table {
        Table::single_row(vec![
            ("name".to_string(), ProbeValue::from(name)),
            ("installed".to_string(), ProbeValue::Boolean(self.installed)),
            ("running".to_string(), ProbeValue::Boolean(self.running)),
            ("enabled".to_string(), ProbeValue::Boolean(self.enabled)),
        ])
    }
}

pub struct ServiceProvider {
    executor: SystemCommandExecutor,
    manager: ServiceManager,
}

impl ServiceProvider {
    pub fn new(executor: SystemCommandExecutor) -> Self {
        Self {
            executor,
            manager: ServiceManager::for_host(),
        }
    }

    pub fn with_manager(mut self, manager: ServiceManager) -> Self {
        self.manager = manager;
        self
    }

    fn query_sc(&self, name: &str) -> Result<ServiceState, ProbeError> {
        let query = self
            .executor
            .execute("sc", &["query", name], None)
            .map_err(|e| e.into_probe_error(OS_SERVICE, name))?;

        if query.exit_code == SC_SERVICE_DOES_NOT_EXIST
            || query.stdout.contains("does not exist as an installed service")
        {
            return Ok(ServiceState::default());
        }
        if !query.success() {
            return Err(ProbeError::query_failed(OS_SERVICE, name, query.stdout.trim()));
        }

        let config = self
            .executor
            .execute("sc", &["qc", name], None)
            .map_err(|e| e.into_probe_error(OS_SERVICE, name))?;
        Ok(parse_sc_output(&query.stdout, &config.stdout))
    }

    fn query_systemd(&self, name: &str) -> Result<ServiceState, ProbeError> {
        let output = self
            .executor
            .execute(
                "systemctl",
                &["show", name, "--property=LoadState,ActiveState,UnitFileState"],
                None,
            )
            .map_err(|e| e.into_probe_error(OS_SERVICE, name))?;

        if !output.success() {
            return Err(ProbeError::query_failed(OS_SERVICE, name, output.stderr.trim()));
        }
        Ok(parse_systemctl_show(&output.stdout))
    }
}

impl ResourceProvider for ServiceProvider {
    fn kind(&self) -> &str {
        OS_SERVICE
    }

    fn connect(&self, _parameters: &ProbeParameters) -> Result<ProviderHandle, ProbeError> {
        Ok(Arc::new(()))
    }

    fn fetch(&self, _handle: &ProviderHandle, query: &str) -> Result<ProbeValue, ProbeError> {
        let name = query.trim();
        if name.is_empty() {
            return Err(ProbeError::invalid_parameters(OS_SERVICE, "empty service name"));
        }
        let state = match self.manager {
            ServiceManager::WindowsSc => self.query_sc(name)?,
            ServiceManager::Systemd => self.query_systemd(name)?,
        };
        Ok(ProbeValue::Table(state.into_table(name)))
    }

    fn describe(&self) -> String {
        match self.manager {
            ServiceManager::WindowsSc => "Windows services through sc".to_string(),
            ServiceManager::Systemd => "systemd units through systemctl".to_string(),
        }
    }
}

/// Combine `sc query` (state) and `sc qc` (start type) output
pub fn parse_sc_output(query: &str, config: &str) -> ServiceState {
    let running = field_line(query, "STATE").is_some_and(|line| line.contains("RUNNING"));
    let enabled = field_line(config, "START_TYPE")
        .is_some_and(|line| line.contains("AUTO_START") || line.contains("BOOT_START") || line.contains("SYSTEM_START"));
    ServiceState {
        installed: true,
        running,
        enabled,
    }
}

fn field_line<'a>(output: &'a str, field: &str) -> Option<&'a str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with(field))
}

/// Parse `systemctl show --property=...` key=value lines
pub fn parse_systemctl_show(output: &str) -> ServiceState {
    let mut state = ServiceState::default();
    for line in output.lines() {
        match line.trim().split_once('=') {
            Some(("LoadState", value)) => state.installed = value != "not-found",
            Some(("ActiveState", value)) => state.running = value == "active",
            Some(("UnitFileState", value)) => {
                state.enabled = matches!(value, "enabled" | "enabled-runtime" | "static")
            }
            _ => {}
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    const SC_QUERY: &str = "
SERVICE_NAME: ReportServer
        TYPE               : 10  WIN32_OWN_PROCESS
        STATE              : 4  RUNNING
                                (STOPPABLE, PAUSABLE, ACCEPTS_SHUTDOWN)
        WIN32_EXIT_CODE    : 0  (0x0)
";

    const SC_QC: &str = "
[SC] QueryServiceConfig SUCCESS

SERVICE_NAME: ReportServer
        TYPE               : 10  WIN32_OWN_PROCESS
        START_TYPE         : 3   DEMAND_START
";

    #[test]
    fn test_parse_sc_output() {
        let state = parse_sc_output(SC_QUERY, SC_QC);
        assert_eq!(
            state,
            ServiceState {
                installed: true,
                running: true,
                enabled: false
            }
        );
    }

    #[test]
    fn test_parse_systemctl_show() {
        let state = parse_systemctl_show("LoadState=loaded\nActiveState=active\nUnitFileState=enabled\n");
        assert!(state.installed && state.running && state.enabled);

        let missing = parse_systemctl_show("LoadState=not-found\nActiveState=inactive\nUnitFileState=\n");
        assert_eq!(missing, ServiceState::default());
    }

    #[test]
    fn test_state_table_columns() {
        let table = ServiceState::default().into_table("Distributed Replay Controller");
        assert_eq!(table.columns, vec!["name", "installed", "running", "enabled"]);
        assert_eq!(table.rows[0][1], ProbeValue::Boolean(false));
    }
}
