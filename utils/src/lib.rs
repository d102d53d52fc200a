use std::io::{BufRead, Write};

/// Exits the process if another process with the given name is already running.
pub fn check_no_concurrent_processes(name: &str) {
    use std::collections::HashSet;
    use std::process::Command;

    let my_pid = std::process::id();

    // Without pidof there is nothing to check against.
    let pidof_output = match Command::new("pidof").arg(name).output() {
        Ok(out) => out,
        Err(_) => return,
    };

    let mut pids: HashSet<u32> = String::from_utf8_lossy(&pidof_output.stdout)
        .split_whitespace()
        .filter_map(|s| s.parse::<u32>().ok())
        .collect();
    pids.remove(&my_pid);

    if !pids.is_empty() {
        eprintln!(
            "Cannot run {} concurrently. Already running with PIDs: {}",
            name,
            pids.iter()
                .map(|pid| format!("{}", pid))
                .collect::<Vec<_>>()
                .join(" ")
        );
        std::process::exit(1);
    }
}

/// Asks a yes/no question on `output` and reads the answer from `input`.
/// An empty answer (or end of input) picks `default`.
pub fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
    default: bool,
) -> std::io::Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(output, "{} {} ", prompt, hint)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(default);
        }
        match line.trim().to_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "Please answer y or n.")?,
        }
    }
}
