//! Plain-text extraction for the script formats operators usually have at
//! hand: Markdown notes, SRT subtitles and RTF documents.

use anyhow::{Context, Result};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex must compile")
}

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| re(r"\n{3,}"));
static LINE_ENDINGS: Lazy<Regex> = Lazy::new(|| re(r"\r\n?"));
static RAW_NEWLINE: Lazy<Regex> = Lazy::new(|| re(r"\r\n?|\n"));

static SRT_INDEX: Lazy<Regex> = Lazy::new(|| re(r"^\s*\d+\s*$"));
static SRT_TIMECODE: Lazy<Regex> =
    Lazy::new(|| re(r"^\s*\d{2}:\d{2}:\d{2},\d{3}\s*-->\s*\d{2}:\d{2}:\d{2},\d{3}"));

static MD_FENCE: Lazy<Regex> = Lazy::new(|| re(r"(?s)```.*?```"));
static MD_INLINE_CODE: Lazy<Regex> = Lazy::new(|| re(r"`([^`]*)`"));
static MD_IMAGE: Lazy<Regex> = Lazy::new(|| re(r"!\[([^\]]*)\]\([^)]*\)"));
static MD_LINK: Lazy<Regex> = Lazy::new(|| re(r"\[([^\]]+)\]\([^)]+\)"));
static MD_HEADING: Lazy<Regex> = Lazy::new(|| re(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+"));
static MD_QUOTE: Lazy<Regex> = Lazy::new(|| re(r"(?m)^[ \t]{0,3}>[ \t]?"));
static MD_LIST: Lazy<Regex> = Lazy::new(|| re(r"(?m)^[ \t]{0,3}(?:[*+-]|\d+\.)[ \t]+"));
static MD_RULE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^[ \t]{0,3}(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$"));
static MD_EMPHASIS: Lazy<[Regex; 5]> = Lazy::new(|| {
    [
        re(r"\*\*([^*]+)\*\*"),
        re(r"__([^_]+)__"),
        re(r"~~([^~]+)~~"),
        re(r"\*([^*]+)\*"),
        re(r"\b_([^_]+)_\b"),
    ]
});
static HTML_TAG: Lazy<Regex> = Lazy::new(|| re(r"<[^>]+>"));

static RTF_UNICODE: Lazy<Regex> = Lazy::new(|| re(r"\\u(-?\d+)\??"));
static RTF_HEX: Lazy<Regex> = Lazy::new(|| re(r"\\'([0-9a-fA-F]{2})"));
static RTF_PARAGRAPH: Lazy<Regex> = Lazy::new(|| re(r"\\(?:pard?|line)\b ?"));
static RTF_TAB: Lazy<Regex> = Lazy::new(|| re(r"\\tab\b ?"));
static RTF_CONTROL: Lazy<Regex> = Lazy::new(|| re(r"\\[a-zA-Z]+-?\d* ?"));
static RTF_TRAILING_WS: Lazy<Regex> = Lazy::new(|| re(r"[\t ]+\n"));
static RTF_LEADING_WS: Lazy<Regex> = Lazy::new(|| re(r"\n[\t ]+"));
static RTF_ARTIFACT_LINE: Lazy<Regex> = Lazy::new(|| re(r"^[;:.,'`~_*\-]{3,}\s*$"));

/// RTF destinations whose content is never visible text.
const RTF_DROPPED_GROUPS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "listtable",
    "listoverridetable",
    "generator",
    "info",
    "filetbl",
    "rsidtbl",
    "themedata",
    "datastore",
    "xmlopen",
    "xmlclose",
    "pict",
    "object",
    "shpinst",
    "header",
    "footer",
    "background",
];

/// Script file formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFormat {
    Plain,
    Markdown,
    Srt,
    Rtf,
}

impl ScriptFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "md" | "markdown" => ScriptFormat::Markdown,
            "srt" => ScriptFormat::Srt,
            "rtf" => ScriptFormat::Rtf,
            _ => ScriptFormat::Plain,
        }
    }

    pub fn extract(self, raw: &str) -> String {
        match self {
            ScriptFormat::Plain => raw.to_string(),
            ScriptFormat::Markdown => md_to_text(raw),
            ScriptFormat::Srt => srt_to_text(raw),
            ScriptFormat::Rtf => rtf_to_text(raw),
        }
    }
}

/// Read a script file and return its plain text.
pub fn load_script(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let format = ScriptFormat::from_path(path);
    let text = format.extract(&raw);
    info!(
        "Loaded {:?} script {} ({} words)",
        format,
        path.display(),
        text.split_whitespace().count()
    );
    Ok(text)
}

/// Drop subtitle indices and timecodes, keeping the dialogue lines.
pub fn srt_to_text(srt: &str) -> String {
    let kept: Vec<&str> = srt
        .lines()
        .filter(|line| !SRT_INDEX.is_match(line) && !SRT_TIMECODE.is_match(line))
        .collect();
    BLANK_RUNS
        .replace_all(&kept.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Strip Markdown syntax down to readable prose.
pub fn md_to_text(md: &str) -> String {
    let mut s = MD_FENCE
        .replace_all(md, |caps: &regex::Captures| caps[0].replace("```", ""))
        .into_owned();
    s = MD_INLINE_CODE.replace_all(&s, "$1").into_owned();
    s = MD_IMAGE.replace_all(&s, "$1").into_owned();
    s = MD_LINK.replace_all(&s, "$1").into_owned();
    s = MD_RULE.replace_all(&s, "").into_owned();
    s = MD_HEADING.replace_all(&s, "").into_owned();
    s = MD_QUOTE.replace_all(&s, "").into_owned();
    s = MD_LIST.replace_all(&s, "").into_owned();
    for emphasis in MD_EMPHASIS.iter() {
        s = emphasis.replace_all(&s, "$1").into_owned();
    }
    s = HTML_TAG.replace_all(&s, "").into_owned();
    s = LINE_ENDINGS.replace_all(&s, "\n").into_owned();
    BLANK_RUNS.replace_all(&s, "\n\n").trim().to_string()
}

/// Extract the visible text of an RTF document.
///
/// Not a full RTF reader: formatting is discarded, paragraphs become
/// newlines and known non-text destinations are skipped entirely.
pub fn rtf_to_text(rtf: &str) -> String {
    // source line breaks are not text; \par and \line are
    let mut s = RAW_NEWLINE.replace_all(&strip_rtf_groups(rtf), " ").into_owned();

    s = RTF_UNICODE
        .replace_all(&s, |caps: &regex::Captures| {
            let code: i64 = caps[1].parse().unwrap_or(0);
            let code = if code < 0 { code + 65_536 } else { code };
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned();
    s = RTF_HEX
        .replace_all(&s, |caps: &regex::Captures| {
            u8::from_str_radix(&caps[1], 16)
                .map(|b| char::from(b).to_string())
                .unwrap_or_default()
        })
        .into_owned();
    s = RTF_PARAGRAPH.replace_all(&s, "\n").into_owned();
    s = RTF_TAB.replace_all(&s, "\t").into_owned();

    // protect escaped specials from the control-word pass
    s = s
        .replace("\\\\", "\u{0}")
        .replace("\\{", "\u{1}")
        .replace("\\}", "\u{2}");
    s = RTF_CONTROL.replace_all(&s, "").into_owned();
    s.retain(|c| c != '{' && c != '}');
    s = s
        .replace('\u{0}', "\\")
        .replace('\u{1}', "{")
        .replace('\u{2}', "}");

    s = LINE_ENDINGS.replace_all(&s, "\n").into_owned();
    s = RTF_TRAILING_WS.replace_all(&s, "\n").into_owned();
    s = RTF_LEADING_WS.replace_all(&s, "\n").into_owned();

    let lines: Vec<&str> = s
        .split('\n')
        .map(str::trim_end)
        .filter(|line| !RTF_ARTIFACT_LINE.is_match(line))
        .collect();
    let text = BLANK_RUNS
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string();
    debug!("Extracted {} chars of text from RTF", text.len());
    text
}

/// Remove `{\*...}` and known non-text destination groups, braces balanced.
fn strip_rtf_groups(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let n = chars.len();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < n {
        if chars[i] == '{' && i + 2 < n && chars[i + 1] == '\\' {
            let mut j = i + 2;
            let starred = chars[j] == '*';
            if starred {
                j += 1;
            }
            let start = j;
            while j < n && chars[j].is_ascii_alphabetic() {
                j += 1;
            }
            let word: String = chars[start..j].iter().collect();

            if starred || RTF_DROPPED_GROUPS.contains(&word.as_str()) {
                let mut depth = 0usize;
                while i < n {
                    match chars[i] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        '\\' => i += 1, // skip the escaped character
                        _ => {}
                    }
                    i += 1;
                    if depth == 0 {
                        break;
                    }
                }
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}
