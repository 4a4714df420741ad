//! Remote command and script text run by the built-in actions.

use crate::types::AlertType;

/// Success marker printed by the Windows service start script
pub const START_SUCCESS: &str = "SUCCESS";

/// Quote a value for a POSIX shell command line
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Quote a value as a PowerShell single-quoted string
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Total usage as a single percentage
pub fn linux_usage(alert: &AlertType) -> &'static str {
    match alert {
        AlertType::Memory => r#"free | awk '/^Mem:/ {printf "%.2f", $3 / $2 * 100}'"#,
        _ => {
            r#"top -b -n 3 -d 1 | grep -i 'cpu(s)' | awk '{sum += 100 - $8} END {if (NR > 0) printf "%.2f", sum / NR}'"#
        }
    }
}

pub fn windows_usage(alert: &AlertType) -> &'static str {
    match alert {
        AlertType::Memory => {
            "$os = Get-CimInstance win32_operatingsystem; \
             [math]::Round((($os.TotalVisibleMemorySize - $os.FreePhysicalMemory) / $os.TotalVisibleMemorySize) * 100, 2)"
        }
        _ => "(Get-CimInstance win32_processor | Measure-Object -Property LoadPercentage -Average).Average",
    }
}

/// `ps` rows (with header) of the top `count` consumers
pub fn linux_top_processes(alert: &AlertType, count: usize) -> String {
    let column = match alert {
        AlertType::Memory => "%mem",
        _ => "%cpu",
    };
    format!("ps -eo pid,comm,{column} --sort=-{column} | head -n {}", count + 1)
}

/// `pid|||name|||usage%~~~` records of the top `count` consumers
pub fn windows_top_processes(alert: &AlertType, count: usize) -> String {
    match alert {
        AlertType::Memory => format!(
            "$total = (Get-CimInstance win32_operatingsystem).TotalVisibleMemorySize * 1KB; \
             Get-Process | Sort-Object WorkingSet64 -Descending | Select-Object -First {count} | \
             ForEach-Object {{ '{{0}}|||{{1}}|||{{2:N2}}%~~~' -f $_.Id, $_.ProcessName, ($_.WorkingSet64 / $total * 100) }}"
        ),
        _ => format!(
            "Get-CimInstance Win32_PerfFormattedData_PerfProc_Process | \
             Where-Object {{ $_.Name -notin '_Total', 'Idle' }} | \
             Sort-Object PercentProcessorTime -Descending | Select-Object -First {count} | \
             ForEach-Object {{ '{{0}}|||{{1}}|||{{2}}%~~~' -f $_.IDProcess, $_.Name, $_.PercentProcessorTime }}"
        ),
    }
}

/// Prints `active`, another systemd state, or `invalid` for unknown units
pub fn linux_service_status(service: &str) -> String {
    let unit = shell_quote(service);
    format!(
        "if systemctl cat {unit} >/dev/null 2>&1; then systemctl is-active {unit} || true; else echo invalid; fi"
    )
}

/// Prints `active` when the restart brought the unit up
pub fn linux_service_restart(service: &str) -> String {
    let unit = shell_quote(service);
    format!("systemctl restart {unit} && systemctl is-active {unit} || true")
}

/// Prints `Running`, `Stopped` (or another state), or `Invalid`
pub fn windows_service_status(service: &str) -> String {
    format!(
        "$svc = Get-Service -Name {} -ErrorAction SilentlyContinue; \
         if ($null -eq $svc) {{ 'Invalid' }} else {{ $svc.Status.ToString() }}",
        ps_quote(service)
    )
}

/// Two start attempts five seconds apart, then one immediate retry.
/// Prints `SUCCESS` or `FAILURE`.
pub fn windows_service_start(service: &str) -> String {
    let name = ps_quote(service);
    format!(
        r"$name = {name}
$maxRepeat = 2
$status = 'FAILURE'
for ($i = 0; $i -lt $maxRepeat; $i++) {{
    Start-Service -Name $name -ErrorAction SilentlyContinue
    Start-Sleep -Milliseconds 5000
    if ((Get-Service -Name $name).Status -eq 'Running') {{ $status = 'SUCCESS'; break }}
}}
if ($status -ne 'SUCCESS') {{
    Start-Service -Name $name -ErrorAction SilentlyContinue
    if ((Get-Service -Name $name).Status -eq 'Running') {{ $status = 'SUCCESS' }}
}}
$status"
    )
}
