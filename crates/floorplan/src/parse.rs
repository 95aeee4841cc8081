//! Problem file parsing and placement output.
//!
//! Input grammar:
//!
//! ```text
//! NumHardRectilinearBlocks : <N>
//! <blockName> hardrectilinear 4 (0,0) (0,<h>) (<w>,<h>) (<w>,0)
//! ...
//! NumSymGroups : <G>
//! SymGroup : <groupName> <count>
//! SymPair <moduleA> <moduleB>
//! SymSelf <moduleC>
//! ```
//!
//! The grammar carries no axis; groups start with a vertical axis and the
//! search may flip it. Output is `A=<area>` followed by one
//! `<name> <x> <y>` line per module in input order.

use crate::module::Module;
use crate::symmetry::{SymmetryAxis, SymmetryGroup};
use std::path::Path;
use symplace_core::{Error, Placement, Result};

/// Parses a problem description.
pub fn parse_problem(text: &str) -> Result<(Vec<Module>, Vec<SymmetryGroup>)> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());

    let block_count = parse_counter(lines.next(), "NumHardRectilinearBlocks")?;
    let mut modules = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        let line = lines
            .next()
            .ok_or_else(|| invalid("unexpected end of file in block list"))?;
        modules.push(parse_block(line)?);
    }

    let group_count = parse_counter(lines.next(), "NumSymGroups")?;
    let mut groups = Vec::with_capacity(group_count);
    for _ in 0..group_count {
        let line = lines
            .next()
            .ok_or_else(|| invalid("unexpected end of file in group list"))?;
        let (name, members) = parse_group_header(line)?;
        let mut group = SymmetryGroup::new(name, SymmetryAxis::Vertical);

        let mut parsed = 0;
        while parsed < members {
            let line = lines
                .next()
                .ok_or_else(|| invalid("unexpected end of file in symmetry group"))?;
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("SymPair") => {
                    let a = tokens
                        .next()
                        .ok_or_else(|| invalid("SymPair needs two module names"))?;
                    let b = tokens
                        .next()
                        .ok_or_else(|| invalid("SymPair needs two module names"))?;
                    group.add_pair(a, b);
                    parsed += 2;
                }
                Some("SymSelf") => {
                    let name = tokens
                        .next()
                        .ok_or_else(|| invalid("SymSelf needs a module name"))?;
                    group.add_self_symmetric(name);
                    parsed += 1;
                }
                other => {
                    return Err(invalid(format!(
                        "expected SymPair or SymSelf, found {:?}",
                        other
                    )));
                }
            }
        }
        if parsed != members {
            return Err(invalid(format!(
                "symmetry group {} declares {} modules but lists {}",
                group.name(),
                members,
                parsed
            )));
        }
        groups.push(group);
    }

    Ok((modules, groups))
}

/// Reads and parses a problem file.
pub fn read_problem_file(path: impl AsRef<Path>) -> Result<(Vec<Module>, Vec<SymmetryGroup>)> {
    let text = std::fs::read_to_string(path)?;
    parse_problem(&text)
}

/// Formats a placement for the output file.
pub fn format_placement(placements: &[Placement], area: i64) -> String {
    let mut out = String::new();
    out.push_str(&format!("A={}\n", area));
    for p in placements {
        out.push_str(&format!("{} {} {}\n", p.name, p.x, p.y));
    }
    out
}

/// Writes a placement file.
pub fn write_placement_file(
    path: impl AsRef<Path>,
    placements: &[Placement],
    area: i64,
) -> Result<()> {
    std::fs::write(path, format_placement(placements, area))?;
    Ok(())
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidInput(message.into())
}

/// Parses `<keyword> : <count>` headers.
fn parse_counter(line: Option<&str>, keyword: &str) -> Result<usize> {
    let line = line.ok_or_else(|| invalid(format!("missing {} header", keyword)))?;
    let mut tokens = line.split_whitespace().filter(|&t| t != ":");
    match tokens.next() {
        Some(t) if t.trim_end_matches(':') == keyword => {}
        other => {
            return Err(invalid(format!(
                "expected {} header, found {:?}",
                keyword, other
            )));
        }
    }
    let count = tokens
        .next()
        .ok_or_else(|| invalid(format!("{} header has no count", keyword)))?;
    count
        .parse()
        .map_err(|_| invalid(format!("bad count in {} header: {}", keyword, count)))
}

/// Parses one `hardrectilinear` block line.
fn parse_block(line: &str) -> Result<Module> {
    let mut tokens = line.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| invalid("block line without a name"))?;
    match tokens.next() {
        Some("hardrectilinear") => {}
        other => {
            return Err(invalid(format!(
                "block {}: expected hardrectilinear, found {:?}",
                name, other
            )));
        }
    }
    let vertex_count: usize = tokens
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| invalid(format!("block {}: bad vertex count", name)))?;
    if vertex_count != 4 {
        return Err(invalid(format!(
            "block {}: only rectangles (4 vertices) are supported",
            name
        )));
    }

    let rest: Vec<&str> = tokens.collect();
    let vertices = parse_vertices(&rest.join(" "))?;
    if vertices.len() != 4 {
        return Err(invalid(format!(
            "block {}: expected 4 vertices, found {}",
            name,
            vertices.len()
        )));
    }

    let width = vertices.iter().map(|v| v.0).max().unwrap_or(0);
    let height = vertices.iter().map(|v| v.1).max().unwrap_or(0);
    if width <= 0 || height <= 0 {
        return Err(invalid(format!(
            "block {}: dimensions must be positive",
            name
        )));
    }
    for &(x, y) in &vertices {
        if (x != 0 && x != width) || (y != 0 && y != height) {
            return Err(invalid(format!(
                "block {}: vertices do not form an axis-aligned rectangle",
                name
            )));
        }
    }

    Ok(Module::new(name, width, height))
}

/// Parses a sequence of `(x,y)` vertices.
fn parse_vertices(text: &str) -> Result<Vec<(i64, i64)>> {
    let mut vertices = Vec::new();
    for token in text.split(')').map(str::trim).filter(|t| !t.is_empty()) {
        let inner = token.trim_start_matches(&['(', ','][..]).trim();
        let mut parts = inner.split(',').map(str::trim);
        let x = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| invalid(format!("bad vertex: {}", token)))?;
        let y = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| invalid(format!("bad vertex: {}", token)))?;
        vertices.push((x, y));
    }
    Ok(vertices)
}

/// Parses a `SymGroup : <name> <count>` header.
fn parse_group_header(line: &str) -> Result<(String, usize)> {
    let mut tokens = line.split_whitespace().filter(|&t| t != ":");
    match tokens.next() {
        Some(t) if t.trim_end_matches(':') == "SymGroup" => {}
        other => {
            return Err(invalid(format!(
                "expected SymGroup header, found {:?}",
                other
            )));
        }
    }
    let name = tokens
        .next()
        .ok_or_else(|| invalid("SymGroup header has no name"))?;
    let count = tokens
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| invalid(format!("SymGroup {}: bad module count", name)))?;
    Ok((name.to_string(), count))
}
