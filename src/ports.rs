use anyhow::{bail, Context, Result};

/// Ports attached to every result when a scan does not name its own.
pub fn default_ports() -> Vec<u16> {
    vec![80, 443]
}

/// Parse a `--ports` value such as `80,443,8000-8002` into a deduplicated list (1..=65535).
///
/// Entries are comma separated; surrounding whitespace and empty entries are ignored.
/// Order of first appearance is preserved.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
        let (start, end) = match item.split_once('-') {
            Some((a, b)) => (
                parse_port_str(a.trim()).with_context(|| format!("invalid start in range: {item}"))?,
                parse_port_str(b.trim()).with_context(|| format!("invalid end in range: {item}"))?,
            ),
            None => {
                let p = parse_port_str(item).with_context(|| format!("invalid port value: {item}"))?;
                (p, p)
            }
        };
        if start > end {
            bail!("invalid range {start}-{end} (start > end)");
        }
        for p in start..=end {
            if seen.insert(p) {
                out.push(p);
            }
        }
    }

    if out.is_empty() {
        bail!("no ports given");
    }
    Ok(out)
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_comma_separated() {
        let ports = parse_ports_str("80, 22,443").unwrap();
        assert_eq!(ports, vec![80, 22, 443]);
    }

    #[test]
    fn parse_ranges_and_dedup() {
        let ports = parse_ports_str("8000-8002,80,8001").unwrap();
        assert_eq!(ports, vec![8000, 8001, 8002, 80]);
    }

    #[test]
    fn blank_entries_are_skipped() {
        assert_eq!(parse_ports_str(" 80,,443, ").unwrap(), vec![80, 443]);
        assert!(parse_ports_str(" , ").is_err());
    }

    #[test]
    fn out_of_range_errors() {
        assert!(parse_ports_str("70000").is_err());
        assert!(parse_ports_str("10-5").is_err());
        assert!(parse_ports_str("80#web").is_err());
    }

    #[test]
    fn default_is_web_ports() {
        assert_eq!(default_ports(), vec![80, 443]);
    }
}
