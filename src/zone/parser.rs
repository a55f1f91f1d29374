use super::record::{parse_ttl, resolve_name};
use super::{Result, ZoneError, ZoneRecord, constants};
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::dns::name::Name;
use std::fs;
use std::path::Path;
use std::str::Lines;
use tracing::{debug, trace};

/// Streaming RFC 1035 zone file reader.
///
/// Yields records in file order. After the first error the iterator is
/// exhausted.
pub struct ZoneParser<'a> {
    lines: Lines<'a>,
    /// Current origin for relative names
    current_origin: Option<Name>,
    /// `$TTL` value, if any
    default_ttl: Option<u32>,
    /// Last explicit TTL, used when no `$TTL` is set
    last_ttl: Option<u32>,
    last_owner: Option<Name>,
    current_class: DNSResourceClass,
    /// Line number for error reporting
    line_number: usize,
    /// `$GENERATE` in progress; one record is expanded per call
    generate: Option<Generate>,
    failed: bool,
}

/// Remaining iterations of a `$GENERATE` directive
struct Generate {
    line: usize,
    lhs: String,
    rtype: String,
    rhs: String,
    /// `None` once the counter would pass `u32::MAX`
    next: Option<u32>,
    stop: u32,
    step: u32,
}

/// One logical entry, possibly spanning lines inside parentheses
struct Entry {
    line: usize,
    tokens: Vec<String>,
    inherits_owner: bool,
}

impl<'a> ZoneParser<'a> {
    pub fn new(contents: &'a str) -> Self {
        Self {
            lines: contents.lines(),
            current_origin: None,
            default_ttl: None,
            last_ttl: None,
            last_owner: None,
            current_class: DNSResourceClass::IN,
            line_number: 0,
            generate: None,
            failed: false,
        }
    }

    /// Origin used until the file sets its own with `$ORIGIN`
    pub fn with_origin(mut self, origin: Name) -> Self {
        self.current_origin = Some(origin);
        self
    }

    pub fn origin(&self) -> Option<&Name> {
        self.current_origin.as_ref()
    }

    /// Read a zone file, refusing anything over [`constants::MAX_ZONE_FILE_SIZE`]
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<String> {
        let path = path.as_ref();
        let size = fs::metadata(path)?.len();
        if size > constants::MAX_ZONE_FILE_SIZE as u64 {
            return Err(ZoneError::FileTooLarge);
        }
        Ok(fs::read_to_string(path)?)
    }

    fn error(&self, line: usize, message: impl Into<String>) -> ZoneError {
        ZoneError::ParseError {
            line,
            message: message.into(),
        }
    }

    fn next_entry(&mut self) -> Result<Option<Entry>> {
        let mut entry: Option<Entry> = None;
        let mut depth = 0usize;

        for line in self.lines.by_ref() {
            self.line_number += 1;
            let current = entry.get_or_insert_with(|| Entry {
                line: self.line_number,
                tokens: Vec::new(),
                inherits_owner: line.starts_with([' ', '\t']),
            });
            tokenize(line, &mut current.tokens, &mut depth).map_err(|message| {
                ZoneError::ParseError {
                    line: self.line_number,
                    message,
                }
            })?;

            if depth == 0 {
                match entry.take() {
                    Some(done) if !done.tokens.is_empty() => {
                        trace!("Parsed entry at line {}: {:?}", done.line, done.tokens);
                        return Ok(Some(done));
                    }
                    _ => continue,
                }
            }
        }

        match entry {
            Some(open) if depth > 0 => Err(self.error(
                open.line,
                format!("Unclosed parentheses starting at line {}", open.line),
            )),
            _ => Ok(None),
        }
    }

    /// Handle a `$` directive. `$GENERATE` only records its range here; the
    /// records are expanded as the iterator is driven.
    fn parse_directive(&mut self, entry: &Entry) -> Result<()> {
        let parts = &entry.tokens;
        match parts[0].to_ascii_uppercase().as_str() {
            "$ORIGIN" => {
                let name = parts
                    .get(1)
                    .ok_or_else(|| self.error(entry.line, "$ORIGIN requires domain name"))?;
                let origin = resolve_name(name, self.current_origin.as_ref())
                    .map_err(|e| self.error(entry.line, e))?;
                debug!("Set origin to: {}", origin);
                self.current_origin = Some(origin);
            }
            "$TTL" => {
                let value = parts
                    .get(1)
                    .ok_or_else(|| self.error(entry.line, "$TTL requires value"))?;
                let ttl = parse_ttl(value).map_err(|e| self.error(entry.line, e))?;
                debug!("Set default TTL to: {}", ttl);
                self.default_ttl = Some(ttl);
            }
            "$GENERATE" => self.parse_generate(entry)?,
            "$INCLUDE" => {
                return Err(self.error(entry.line, "$INCLUDE is not supported"));
            }
            _ => {
                debug!("Unknown directive: {}", parts[0]);
            }
        }
        Ok(())
    }

    /// `$GENERATE start-stop[/step] lhs type rhs...`
    fn parse_generate(&mut self, entry: &Entry) -> Result<()> {
        let parts = &entry.tokens;
        if parts.len() < 5 {
            return Err(self.error(
                entry.line,
                "$GENERATE requires range, lhs, type, and rhs",
            ));
        }

        let (start, stop, step) =
            parse_generate_range(&parts[1]).map_err(|e| self.error(entry.line, e))?;
        debug!("Expanding $GENERATE {}-{}/{} at line {}", start, stop, step, entry.line);
        self.generate = Some(Generate {
            line: entry.line,
            lhs: parts[2].clone(),
            rtype: parts[3].clone(),
            rhs: parts[4..].join(" "),
            next: Some(start),
            stop,
            step,
        });
        Ok(())
    }

    /// Next record of the `$GENERATE` in progress, if any
    fn next_generated(&mut self) -> Result<Option<ZoneRecord>> {
        let Some(state) = self.generate.as_mut() else {
            return Ok(None);
        };
        let Some(i) = state.next.filter(|&i| i <= state.stop) else {
            self.generate = None;
            return Ok(None);
        };
        state.next = i.checked_add(state.step);

        let line = state.line;
        let owner = expand_generate_format(&state.lhs, i);
        let rdata = expand_generate_format(&state.rhs, i);
        let rtype = state.rtype.clone();

        let owner = owner.map_err(|e| self.error(line, e))?;
        let rdata = rdata.map_err(|e| self.error(line, e))?;
        let mut tokens = vec![owner, rtype];
        tokens.extend(rdata.split_whitespace().map(str::to_string));
        self.parse_record(&Entry {
            line,
            tokens,
            inherits_owner: false,
        })
        .map(Some)
    }

    /// Parse a resource record entry: `[owner] [ttl] [class] type rdata...`
    fn parse_record(&mut self, entry: &Entry) -> Result<ZoneRecord> {
        let parts = &entry.tokens;
        let mut idx = 0;

        let owner = if entry.inherits_owner {
            self.last_owner
                .clone()
                .ok_or_else(|| self.error(entry.line, "No previous owner to inherit"))?
        } else {
            idx += 1;
            resolve_name(&parts[0], self.current_origin.as_ref())
                .map_err(|e| self.error(entry.line, e))?
        };

        // TTL and class may appear in either order before the type
        let mut ttl = None;
        let mut class = None;
        let mut rtype = None;
        while let Some(field) = parts.get(idx) {
            idx += 1;
            if ttl.is_none() && field.starts_with(|c: char| c.is_ascii_digit()) {
                if let Ok(value) = parse_ttl(field) {
                    ttl = Some(value);
                    continue;
                }
            }
            if class.is_none() {
                if let Ok(parsed) = field.parse::<DNSResourceClass>() {
                    class = Some(parsed);
                    continue;
                }
            }
            match field.parse::<DNSResourceType>() {
                Ok(parsed) => {
                    rtype = Some(parsed);
                    break;
                }
                Err(_) => {
                    return Err(self.error(entry.line, format!("Invalid field: {}", field)));
                }
            }
        }

        let rtype = rtype.ok_or_else(|| self.error(entry.line, "Missing record type"))?;
        let fields = &parts[idx..];
        if fields.is_empty() {
            return Err(self.error(entry.line, "Missing RDATA"));
        }

        let ttl = match ttl {
            Some(explicit) => {
                self.last_ttl = Some(explicit);
                explicit
            }
            None => self
                .default_ttl
                .or(self.last_ttl)
                .unwrap_or(constants::DEFAULT_TTL),
        };
        let class = class.unwrap_or(self.current_class);
        self.current_class = class;

        let rdata = ZoneRecord::encode_rdata(rtype, fields, self.current_origin.as_ref())
            .map_err(|e| self.error(entry.line, e))?;

        self.last_owner = Some(owner.clone());
        Ok(ZoneRecord::new(owner, ttl, class, rtype, rdata))
    }

    fn advance(&mut self) -> Result<Option<ZoneRecord>> {
        loop {
            if let Some(record) = self.next_generated()? {
                return Ok(Some(record));
            }
            let Some(entry) = self.next_entry()? else {
                return Ok(None);
            };
            if !entry.inherits_owner && entry.tokens[0].starts_with('$') {
                self.parse_directive(&entry)?;
                continue;
            }
            return self.parse_record(&entry).map(Some);
        }
    }
}

impl Iterator for ZoneParser<'_> {
    type Item = Result<ZoneRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Split one line into tokens, tracking parenthesis depth across lines.
/// Quoted strings keep their quotes; escapes are left for rdata encoding.
fn tokenize(
    line: &str,
    tokens: &mut Vec<String>,
    depth: &mut usize,
) -> std::result::Result<(), String> {
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars();

    fn flush(current: &mut String, tokens: &mut Vec<String>) {
        if !current.is_empty() {
            tokens.push(std::mem::take(current));
        }
    }

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                current.push(ch);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '"' => {
                current.push(ch);
                in_quotes = !in_quotes;
                if !in_quotes {
                    flush(&mut current, tokens);
                }
            }
            _ if in_quotes => current.push(ch),
            ';' => break,
            '(' => {
                flush(&mut current, tokens);
                *depth += 1;
            }
            ')' => {
                flush(&mut current, tokens);
                *depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "Unbalanced ')'".to_string())?;
            }
            c if c.is_whitespace() => flush(&mut current, tokens),
            _ => current.push(ch),
        }
    }

    if in_quotes {
        return Err("Unterminated quoted string".to_string());
    }
    flush(&mut current, tokens);
    Ok(())
}

/// Parse a `$GENERATE` range: start-stop[/step]
fn parse_generate_range(range_str: &str) -> std::result::Result<(u32, u32, u32), String> {
    let (range, step) = match range_str.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (range_str, None),
    };

    let (start_str, stop_str) = range
        .split_once('-')
        .ok_or_else(|| "$GENERATE range must contain '-'".to_string())?;
    let start = start_str
        .parse::<u32>()
        .map_err(|_| format!("Invalid $GENERATE start: {}", start_str))?;
    let stop = stop_str
        .parse::<u32>()
        .map_err(|_| format!("Invalid $GENERATE stop: {}", stop_str))?;
    let step = match step {
        Some(step) => step
            .parse::<u32>()
            .map_err(|_| format!("Invalid $GENERATE step: {}", step))?,
        None => 1,
    };

    if start > stop {
        return Err("$GENERATE start must be <= stop".to_string());
    }
    if step == 0 {
        return Err("$GENERATE step must be > 0".to_string());
    }
    Ok((start, stop, step))
}

/// Substitute `$` and `${offset,width,base}` with the iteration value
fn expand_generate_format(template: &str, value: u32) -> std::result::Result<String, String> {
    let mut result = String::new();
    let mut chars = template.chars();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        if !chars.as_str().starts_with('{') {
            result.push_str(&value.to_string());
            continue;
        }
        chars.next();

        let rest = chars.as_str();
        let close = rest
            .find('}')
            .ok_or_else(|| "Unclosed ${} in $GENERATE".to_string())?;
        let modifier = &rest[..close];
        chars = rest[close + 1..].chars();

        let parts: Vec<&str> = modifier.split(',').collect();
        if parts.len() != 3 {
            return Err("Invalid $GENERATE format, expected ${offset,width,base}".to_string());
        }
        let offset = parts[0]
            .parse::<u32>()
            .map_err(|_| format!("Invalid offset: {}", parts[0]))?;
        let width = parts[1]
            .parse::<usize>()
            .map_err(|_| format!("Invalid width: {}", parts[1]))?;
        let adjusted = value
            .checked_add(offset)
            .ok_or_else(|| format!("Offset overflows: {}", parts[0]))?;

        let formatted = match parts[2] {
            "d" => format!("{:0width$}", adjusted, width = width),
            "o" => format!("{:0width$o}", adjusted, width = width),
            "x" => format!("{:0width$x}", adjusted, width = width),
            "X" => format!("{:0width$X}", adjusted, width = width),
            base => {
                return Err(format!(
                    "Invalid base '{}', expected d, o, x, or X",
                    base
                ));
            }
        };
        result.push_str(&formatted);
    }

    Ok(result)
}
