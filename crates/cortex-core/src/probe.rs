//! Service-detection probe catalogue: parses the nmap-service-probes text
//! format into an immutable, concurrently-readable [`ProbeCatalogue`].

use crate::error::Error;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

const EMBEDDED_PROBES: &str = include_str!("../data/cortex-service-probes");

/// Protocol a probe is sent over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// One `(pattern, service name)` rule belonging to a probe.
#[derive(Debug, Clone)]
pub struct Match {
    pub service_name: String,
    pub pattern: Regex,
    /// nmap version-info tokens (`p/`, `v/`, `i/`, `o/`), currently unused
    /// but preserved for forward compatibility.
    pub version_info: HashMap<String, String>,
}

impl PartialEq for Match {
    fn eq(&self, other: &Self) -> bool {
        self.service_name == other.service_name
            && self.pattern.as_str() == other.pattern.as_str()
            && self.version_info == other.version_info
    }
}

/// A single service-detection rule: bytes to send plus patterns for
/// interpreting what comes back. Immutable after load, shared read-only
/// by all workers.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub protocol: Protocol,
    pub name: String,
    pub data: Vec<u8>,
    pub matches: Vec<Match>,
}

/// Diagnostic artifact returned alongside a catalogue. Reported once,
/// never mutated.
#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    pub total_lines: usize,
    pub probe_count: usize,
    pub match_count: usize,
    pub error_lines: Vec<(usize, String)>,
}

/// The loaded probe database: the full probe list plus derived views
/// partitioned by protocol and a name-to-probes multimap.
#[derive(Debug, Clone, Default)]
pub struct ProbeCatalogue {
    probes: Vec<Probe>,
    tcp_indices: Vec<usize>,
    udp_indices: Vec<usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl ProbeCatalogue {
    /// Parses a probe file's contents into a catalogue plus load
    /// diagnostics. Never fails: unparseable directives are recorded in
    /// `LoadStats::error_lines` and parsing continues.
    pub fn parse(content: &str) -> (Self, LoadStats) {
        let mut stats = LoadStats::default();
        let mut probes = Vec::new();
        let mut current: Option<Probe> = None;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx + 1;
            stats.total_lines += 1;
            let line = raw_line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix("Probe ") {
                if let Some(probe) = current.take() {
                    stats.match_count += probe.matches.len();
                    probes.push(probe);
                }
                match parse_probe_directive(rest) {
                    Some(probe) => current = Some(probe),
                    None => stats
                        .error_lines
                        .push((line_no, format!("malformed Probe directive: {line}"))),
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("match ") {
                match current.as_mut() {
                    Some(probe) => match parse_match_directive(rest) {
                        MatchOutcome::Matched(m) => probe.matches.push(m),
                        MatchOutcome::Dropped => {}
                        MatchOutcome::Error(msg) => stats.error_lines.push((line_no, msg)),
                    },
                    None => stats
                        .error_lines
                        .push((line_no, "match directive outside a probe".into())),
                }
                continue;
            }

            if is_ignored_directive(line) {
                continue;
            }

            stats
                .error_lines
                .push((line_no, format!("unrecognized directive: {line}")));
        }

        if let Some(probe) = current.take() {
            stats.match_count += probe.matches.len();
            probes.push(probe);
        }

        stats.probe_count = probes.len();

        let mut tcp_indices = Vec::new();
        let mut udp_indices = Vec::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, probe) in probes.iter().enumerate() {
            match probe.protocol {
                Protocol::Tcp => tcp_indices.push(i),
                Protocol::Udp => udp_indices.push(i),
            }
            by_name.entry(probe.name.clone()).or_default().push(i);
        }

        (
            ProbeCatalogue {
                probes,
                tcp_indices,
                udp_indices,
                by_name,
            },
            stats,
        )
    }

    /// All TCP probes, in file order.
    pub fn tcp_probes(&self) -> Vec<&Probe> {
        self.tcp_indices.iter().map(|&i| &self.probes[i]).collect()
    }

    /// All UDP probes, in file order.
    pub fn udp_probes(&self) -> Vec<&Probe> {
        self.udp_indices.iter().map(|&i| &self.probes[i]).collect()
    }

    pub fn probes_named(&self, name: &str) -> Vec<&Probe> {
        self.by_name
            .get(name)
            .map(|idxs| idxs.iter().map(|&i| &self.probes[i]).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Loads a catalogue from the probe file at `path`. Fatal: the file
    /// must exist and be readable, per §4.1's startup contract.
    pub fn load_from_file(path: &Path) -> Result<(Self, LoadStats), Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ProbeFile(format!("{}: {e}", path.display())))?;
        Ok(Self::parse(&content))
    }

    /// Loads the small representative catalogue embedded in the binary.
    pub fn load_embedded() -> (Self, LoadStats) {
        Self::parse(EMBEDDED_PROBES)
    }
}

fn is_ignored_directive(line: &str) -> bool {
    const IGNORED_PREFIXES: &[&str] = &[
        "softmatch ",
        "ports ",
        "sslports ",
        "rarity ",
        "fallback ",
        "Exclude ",
        "totalwaitms ",
        "tcpwrappedms ",
    ];
    IGNORED_PREFIXES.iter().any(|p| line.starts_with(p))
}

fn parse_probe_directive(rest: &str) -> Option<Probe> {
    let (proto_str, rest) = rest.split_once(' ')?;
    let protocol = match proto_str {
        "TCP" => Protocol::Tcp,
        "UDP" => Protocol::Udp,
        _ => return None,
    };

    let (name, rest) = rest.split_once(" q|")?;
    let close = rest.find('|')?;
    let payload_src = &rest[..close];
    let data = decode_payload(payload_src);

    Some(Probe {
        protocol,
        name: name.to_string(),
        data,
        matches: Vec::new(),
    })
}

/// Decodes the bytes between a probe's `q|...|` delimiters per the
/// payload escape rules: octal `\0NN`, case-insensitive `\xHH`, and the
/// standard C escapes.
fn decode_payload(s: &str) -> Vec<u8> {
    let bytes: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c != '\\' {
            out.push(c as u8);
            i += 1;
            continue;
        }
        if i + 1 >= bytes.len() {
            out.push(b'\\');
            i += 1;
            continue;
        }
        let next = bytes[i + 1];
        match next {
            '0' => {
                // \0XX is a single octal byte: the leading 0 plus exactly
                // two more octal digits form the value; bare \0 is NUL.
                if i + 3 < bytes.len() && bytes[i + 2].is_digit(8) && bytes[i + 3].is_digit(8) {
                    let octal: String = bytes[i + 1..i + 4].iter().collect();
                    let byte = u8::from_str_radix(&octal, 8).unwrap_or(0);
                    out.push(byte);
                    i += 4;
                } else {
                    out.push(0u8);
                    i += 2;
                }
            }
            'x' if i + 3 < bytes.len() => {
                let hex: String = bytes[i + 2..i + 4].iter().collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 4;
                    }
                    Err(_) => {
                        out.push(c as u8);
                        i += 1;
                    }
                }
            }
            'n' => {
                out.push(b'\n');
                i += 2;
            }
            'r' => {
                out.push(b'\r');
                i += 2;
            }
            't' => {
                out.push(b'\t');
                i += 2;
            }
            '\\' => {
                out.push(b'\\');
                i += 2;
            }
            '"' => {
                out.push(b'"');
                i += 2;
            }
            other => {
                out.push(other as u8);
                i += 2;
            }
        }
    }
    out
}

enum MatchOutcome {
    Matched(Match),
    /// An RE2-incompatible feature; silently dropped per §4.1.
    Dropped,
    Error(String),
}

/// Parses `<service> m<sep><pattern><sep><flags-and-version>`.
fn parse_match_directive(rest: &str) -> MatchOutcome {
    let Some((service, remainder)) = rest.split_once(' ') else {
        return MatchOutcome::Error(format!("malformed match directive: {rest}"));
    };
    let remainder = remainder.trim_start();
    let Some(body) = remainder.strip_prefix('m') else {
        return MatchOutcome::Error(format!("match directive missing 'm': {rest}"));
    };
    let Some(sep) = body.chars().next() else {
        return MatchOutcome::Error(format!("match directive missing separator: {rest}"));
    };
    let body = &body[sep.len_utf8()..];
    let Some(pattern_end) = body.find(sep) else {
        return MatchOutcome::Error(format!("unterminated pattern: {rest}"));
    };
    let pattern_str = &body[..pattern_end];
    let suffix = &body[pattern_end + sep.len_utf8()..];

    if is_unsupported_regex(pattern_str) {
        return MatchOutcome::Dropped;
    }

    let mut flags = String::new();
    let mut version_info = HashMap::new();
    let mut chars = suffix.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            'i' | 's' => {
                flags.push(c);
                chars.next();
            }
            ' ' | '\t' => {
                chars.next();
            }
            _ => break,
        }
    }
    let version_suffix: String = chars.collect();
    for token in version_suffix.split_whitespace() {
        for (prefix, key) in [
            ("p/", "product"),
            ("v/", "version"),
            ("i/", "info"),
            ("h/", "hostname"),
            ("o/", "os_type"),
            ("d/", "device_type"),
        ] {
            if let Some(rest) = token.strip_prefix(prefix) {
                if let Some(value) = rest.strip_suffix('/') {
                    version_info.insert(key.to_string(), value.to_string());
                }
            }
        }
    }

    let mut pattern_with_flags = String::new();
    if flags.contains('i') {
        pattern_with_flags.push_str("(?i)");
    }
    if flags.contains('s') {
        pattern_with_flags.push_str("(?s)");
    }
    pattern_with_flags.push_str(pattern_str);

    match Regex::new(&pattern_with_flags) {
        Ok(pattern) => MatchOutcome::Matched(Match {
            service_name: service.to_string(),
            pattern,
            version_info,
        }),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("invalid repetition") {
                MatchOutcome::Dropped
            } else {
                MatchOutcome::Error(format!("regex compile error: {msg}"))
            }
        }
    }
}

/// RE2 (the `regex` crate) doesn't support lookaround or backreferences;
/// the nmap database occasionally uses them. Per spec these are dropped
/// without a diagnostic rather than surfaced as parse errors.
fn is_unsupported_regex(pattern: &str) -> bool {
    const LOOKAROUND: &[&str] = &["(?!", "(?=", "(?<=", "(?<!"];
    if LOOKAROUND.iter().any(|p| pattern.contains(p)) {
        return true;
    }
    let bytes = pattern.as_bytes();
    for w in bytes.windows(2) {
        if w[0] == b'\\' && w[1].is_ascii_digit() && w[1] != b'0' {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_probe_with_match() {
        let content = "Probe TCP NULL q||\nmatch ftp m|^220.*FTP|i\n";
        let (catalogue, stats) = ProbeCatalogue::parse(content);
        assert_eq!(stats.probe_count, 1);
        assert_eq!(stats.match_count, 1);
        assert!(stats.error_lines.is_empty());
        assert_eq!(catalogue.tcp_probes().len(), 1);
        assert_eq!(catalogue.tcp_probes()[0].matches[0].service_name, "ftp");
    }

    #[test]
    fn decodes_payload_escapes() {
        assert_eq!(
            decode_payload("GET / HTTP/1.0\\r\\n\\r\\n"),
            b"GET / HTTP/1.0\r\n\r\n"
        );
        assert_eq!(decode_payload("\\x00\\x01\\x02"), vec![0x00, 0x01, 0x02]);
        assert_eq!(decode_payload("\\0101"), vec![0o010, b'1']);
        assert_eq!(decode_payload("a\\0b"), vec![b'a', 0u8, b'b']);
        assert_eq!(decode_payload("\\xFf"), vec![0xff]);
    }

    #[test]
    fn unknown_directives_are_accumulated_as_errors() {
        let content = "Probe TCP NULL q||\nbogus directive here\n";
        let (_, stats) = ProbeCatalogue::parse(content);
        assert_eq!(stats.error_lines.len(), 1);
        assert_eq!(stats.error_lines[0].0, 2);
    }

    #[test]
    fn ignored_directives_are_not_errors() {
        let content = "Probe TCP NULL q||\nports 21,22\nsslports 990\nrarity 1\nfallback NULL\nExclude T:9100\ntotalwaitms 5000\ntcpwrappedms 3000\n";
        let (_, stats) = ProbeCatalogue::parse(content);
        assert!(stats.error_lines.is_empty());
    }

    #[test]
    fn lookaround_and_backreferences_are_silently_dropped() {
        let content = "Probe TCP T q||\nmatch a m|(?<=foo)bar|\nmatch b m|(\\w)\\1|\n";
        let (catalogue, stats) = ProbeCatalogue::parse(content);
        assert!(stats.error_lines.is_empty());
        assert!(catalogue.tcp_probes()[0].matches.is_empty());
    }

    #[test]
    fn invalid_repeat_count_is_silently_dropped() {
        let content = "Probe TCP T q||\nmatch a m|a{2,1}|\n";
        let (catalogue, stats) = ProbeCatalogue::parse(content);
        assert!(stats.error_lines.is_empty());
        assert!(catalogue.tcp_probes()[0].matches.is_empty());
    }

    #[test]
    fn match_flags_apply_case_insensitive_and_dotall() {
        let content = "Probe TCP T q||\nmatch a m=^http=i\n";
        let (catalogue, _) = ProbeCatalogue::parse(content);
        let m = &catalogue.tcp_probes()[0].matches[0];
        assert!(m.pattern.is_match("HTTP"));
    }

    #[test]
    fn version_info_tokens_are_captured() {
        let content = "Probe TCP T q||\nmatch http m|^HTTP| p/Apache/ v/2.4/\n";
        let (catalogue, _) = ProbeCatalogue::parse(content);
        let m = &catalogue.tcp_probes()[0].matches[0];
        assert_eq!(m.version_info.get("product").unwrap(), "Apache");
        assert_eq!(m.version_info.get("version").unwrap(), "2.4");
    }

    #[test]
    fn probes_for_protocol_are_partitioned() {
        let content = "Probe TCP T q|a|\nmatch t m|x|\n\nProbe UDP U q|b|\nmatch u m|y|\n";
        let (catalogue, _) = ProbeCatalogue::parse(content);
        assert_eq!(catalogue.tcp_probes().len(), 1);
        assert_eq!(catalogue.udp_probes().len(), 1);
        assert_eq!(catalogue.len(), 2);
    }

    #[test]
    fn repeated_reads_are_byte_identical() {
        let content = "Probe TCP T q|a|\nmatch t m|x|\n";
        let (catalogue, _) = ProbeCatalogue::parse(content);
        let a: Vec<Vec<u8>> = catalogue
            .tcp_probes()
            .iter()
            .map(|p| p.data.clone())
            .collect();
        let b: Vec<Vec<u8>> = catalogue
            .tcp_probes()
            .iter()
            .map(|p| p.data.clone())
            .collect();
        assert_eq!(a, b);
    }
}
