use log::debug;

use super::{read_file, ProcFs, SourceError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterruptLine {
    pub name: String,
    /// Count summed over every CPU column.
    pub total: u64,
    pub description: String,
}

pub fn parse_interrupts(text: &str) -> Vec<InterruptLine> {
    let mut lines = text.lines();
    let cpu_count = match lines.next() {
        Some(header) => header.split_whitespace().count(),
        None => return Vec::new(),
    };

    let mut parsed = Vec::new();
    for line in lines {
        let Some((name, rest)) = line.split_once(':') else {
            debug!("skipping malformed /proc/interrupts line {:?}", line);
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        let mut total = 0u64;
        let mut counted = 0usize;
        let mut description = Vec::new();
        for token in rest.split_whitespace() {
            if counted < cpu_count && description.is_empty() {
                if let Ok(value) = token.parse::<u64>() {
                    total = total.saturating_add(value);
                    counted += 1;
                    continue;
                }
            }
            description.push(token);
        }
        if counted == 0 {
            debug!("skipping /proc/interrupts line without counts: {:?}", line);
            continue;
        }

        parsed.push(InterruptLine {
            name: name.to_string(),
            total,
            description: description.join(" "),
        });
    }
    parsed
}

impl ProcFs {
    pub fn read_interrupts(&self) -> Result<Vec<InterruptLine>, SourceError> {
        let path = self.proc_path("interrupts");
        let text = read_file(&path)?;
        let lines = parse_interrupts(&text);
        if lines.is_empty() {
            return Err(SourceError::Missing {
                path,
                field: "interrupt lines",
            });
        }
        Ok(lines)
    }
}
