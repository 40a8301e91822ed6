use std::collections::BTreeMap;
use std::fs;
use std::iter::Peekable;
use std::path::Path;
use std::str::CharIndices;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE_NAME: &str = "version_info.php";
pub const PAYLOAD_FILE_NAME: &str = "source_code.zip";

const PHP_OPEN_TAG: &str = "<?php";

/// Version pair shipped with an update package.
///
/// The manifest is read as data and never evaluated. A PHP `return [...]` array
/// literal of string pairs is accepted, as is a TOML document with the same keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionManifest {
    pub current_version: String,
    pub update_version: String,
}

impl VersionManifest {
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        if input.trim_start().starts_with(PHP_OPEN_TAG) {
            Self::from_php_str(input)
        } else {
            Self::from_toml_str(input)
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read version manifest: {}", path.display()))?;
        Self::parse(&raw)
            .with_context(|| format!("failed to parse version manifest: {}", path.display()))
    }

    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let manifest: Self = toml::from_str(input).context("failed to parse version manifest")?;
        manifest.validated()
    }

    pub fn from_php_str(input: &str) -> anyhow::Result<Self> {
        let mut entries = parse_php_string_array(input)?;
        let mut take = |key: &str| {
            entries
                .remove(key)
                .ok_or_else(|| anyhow!("version manifest is missing '{key}'"))
        };
        Self {
            current_version: take("current_version")?,
            update_version: take("update_version")?,
        }
        .validated()
    }

    fn validated(self) -> anyhow::Result<Self> {
        let current_version = self.current_version.trim().to_string();
        let update_version = self.update_version.trim().to_string();
        if current_version.is_empty() {
            return Err(anyhow!("version manifest current_version must not be empty"));
        }
        if update_version.is_empty() {
            return Err(anyhow!("version manifest update_version must not be empty"));
        }
        Ok(Self {
            current_version,
            update_version,
        })
    }
}

/// Collects `'key' => 'value'` pairs from a PHP array literal. Keywords,
/// brackets and comments are skipped; any non-string value is rejected.
fn parse_php_string_array(input: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let body = input
        .trim_start()
        .strip_prefix(PHP_OPEN_TAG)
        .unwrap_or(input);

    let mut entries = BTreeMap::new();
    let mut last_string: Option<String> = None;
    let mut pending_key: Option<String> = None;
    let mut chars = body.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        match ch {
            '\'' | '"' => {
                let value = read_php_string(&mut chars, ch)?;
                match pending_key.take() {
                    Some(key) => {
                        entries.insert(key, value);
                    }
                    None => last_string = Some(value),
                }
            }
            '=' if matches!(chars.peek(), Some((_, '>'))) => {
                chars.next();
                let key = last_string
                    .take()
                    .ok_or_else(|| anyhow!("array key before '=>' must be a string literal"))?;
                pending_key = Some(key);
            }
            '#' => skip_line(&mut chars),
            '/' if matches!(chars.peek(), Some((_, '/'))) => skip_line(&mut chars),
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                skip_block_comment(&mut chars)?;
            }
            ',' => last_string = None,
            '[' | ']' | '(' | ')' | ';' => {}
            '?' if matches!(chars.peek(), Some((_, '>'))) => break,
            ch if ch.is_whitespace() => {}
            ch if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == '-' => {
                let mut word = String::from(ch);
                while let Some((_, next)) = chars.peek().copied() {
                    if next.is_ascii_alphanumeric() || next == '_' || next == '.' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Some(key) = &pending_key {
                    return Err(anyhow!(
                        "value for '{key}' must be a string literal, found '{word}'"
                    ));
                }
                if !matches!(word.to_ascii_lowercase().as_str(), "return" | "array") {
                    return Err(anyhow!("unexpected token '{word}' in version manifest"));
                }
            }
            other => {
                return Err(anyhow!("unexpected character '{other}' in version manifest"));
            }
        }
    }

    if let Some(key) = pending_key {
        return Err(anyhow!("missing value for '{key}' in version manifest"));
    }
    Ok(entries)
}

fn read_php_string(chars: &mut Peekable<CharIndices<'_>>, quote: char) -> anyhow::Result<String> {
    let mut out = String::new();
    while let Some((_, ch)) = chars.next() {
        if ch == quote {
            return Ok(out);
        }
        if ch != '\\' {
            out.push(ch);
            continue;
        }

        let (_, escaped) = chars
            .next()
            .ok_or_else(|| anyhow!("unterminated string literal in version manifest"))?;
        match (quote, escaped) {
            (_, '\\') => out.push('\\'),
            (q, e) if q == e => out.push(e),
            ('"', 'n') => out.push('\n'),
            ('"', 't') => out.push('\t'),
            ('"', '$') => out.push('$'),
            (_, other) => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Err(anyhow!("unterminated string literal in version manifest"))
}

fn skip_line(chars: &mut Peekable<CharIndices<'_>>) {
    for (_, ch) in chars.by_ref() {
        if ch == '\n' {
            break;
        }
    }
}

fn skip_block_comment(chars: &mut Peekable<CharIndices<'_>>) -> anyhow::Result<()> {
    while let Some((_, ch)) = chars.next() {
        if ch == '*' && matches!(chars.peek(), Some((_, '/'))) {
            chars.next();
            return Ok(());
        }
    }
    Err(anyhow!("unterminated comment in version manifest"))
}
