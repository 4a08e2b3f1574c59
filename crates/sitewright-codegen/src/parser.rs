//! Parser for `FILE: <path>` + fenced block replies.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::GeneratedFile;

/// Marker line, allowing markdown decoration before `FILE:`.
static MARKER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t>#*_`]*FILE:[ \t]*(.+?)[ \t]*$").ok());

/// Extracts every file block from a model reply.
///
/// Each section runs from a marker line to the next marker. Its content is
/// whatever lies between the first opening fence and the last closing fence
/// of the section, trimmed. Sections without a complete fence pair and paths
/// that are absolute or climb with `..` are dropped. When a path repeats, the
/// last block wins but the file keeps its first position.
#[must_use]
pub fn parse_files(reply: &str) -> Vec<GeneratedFile> {
    let Some(marker) = MARKER.as_ref() else {
        warn!("File marker pattern failed to compile");
        return Vec::new();
    };

    let markers: Vec<(usize, usize, &str)> = marker
        .captures_iter(reply)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            Some((whole.start(), whole.end(), name.as_str()))
        })
        .collect();

    let mut files: Vec<GeneratedFile> = Vec::with_capacity(markers.len());
    for (i, &(_, body_start, raw_name)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map_or(reply.len(), |next| next.0);
        let body = &reply[body_start..body_end];

        let Some(name) = clean_name(raw_name) else {
            warn!(name = %raw_name, "Dropping file with unsafe path");
            continue;
        };
        let Some(content) = fenced_content(body) else {
            debug!(name = %name, "Dropping file without a complete fenced block");
            continue;
        };

        match files.iter_mut().find(|f| f.name == name) {
            Some(existing) => {
                debug!(name = %name, "Duplicate file block, keeping the last one");
                existing.content = content;
            }
            None => files.push(GeneratedFile { name, content }),
        }
    }
    files
}

/// Strips decoration from a marker name and rejects unsafe paths.
fn clean_name(raw: &str) -> Option<String> {
    let name = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '`' | '_' | '"' | '\''))
        .trim();
    let name = name.strip_prefix("./").unwrap_or(name);

    if name.is_empty()
        || name.starts_with('/')
        || name.starts_with('\\')
        || name.contains(':')
        || name.split(['/', '\\']).any(|part| part == "..")
    {
        return None;
    }
    Some(name.to_string())
}

/// Returns the trimmed text between the first opening fence and the last
/// closing fence in `body`.
fn fenced_content(body: &str) -> Option<String> {
    let lines: Vec<&str> = body.lines().collect();

    let (open_idx, open_len) = lines.iter().enumerate().find_map(|(i, line)| {
        let ticks = backtick_prefix(line.trim_start());
        (ticks >= 3).then_some((i, ticks))
    })?;

    let close_idx = lines
        .iter()
        .enumerate()
        .skip(open_idx + 1)
        .rev()
        .find_map(|(i, line)| {
            let trimmed = line.trim();
            let ticks = backtick_prefix(trimmed);
            (ticks >= open_len && ticks == trimmed.len()).then_some(i)
        })?;

    Some(lines[open_idx + 1..close_idx].join("\n").trim().to_string())
}

fn backtick_prefix(line: &str) -> usize {
    line.chars().take_while(|&c| c == '`').count()
}
