//! Post-processing of assembled provider text.
//!
//! Markers are bracketed tags embedded by the model:
//! - `[SEED:<category>:<description>]` plants a hidden seed
//! - `[MOOD:<tag>]` cues the audio collaborator
//!
//! Both are removed from display text. A marker with an unknown category or
//! an empty body is still removed, just not recorded.

use super::config::ChoiceSyntax;
use crate::story::SeedCategory;

const SEED_PREFIX: &[u8] = b"SEED:";
const MOOD_PREFIX: &[u8] = b"MOOD:";

/// A recognised marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Seed {
        category: SeedCategory,
        description: String,
    },
    Mood(String),
    Malformed,
}

/// A marker and its byte range in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSpan {
    pub start: usize,
    pub end: usize,
    pub marker: Marker,
}

/// A seed annotation found in text, before it is assigned turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedMarker {
    pub category: SeedCategory,
    pub description: String,
}

/// Output of [`process_response`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Processed {
    pub text: String,
    pub choices: Vec<String>,
    pub seeds: Vec<SeedMarker>,
    pub moods: Vec<String>,
}

fn has_prefix_ignore_case(bytes: &[u8], prefix: &[u8]) -> bool {
    bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Whether `bytes` could still grow into a marker prefix.
fn is_partial_prefix(bytes: &[u8]) -> bool {
    [SEED_PREFIX, MOOD_PREFIX].iter().any(|prefix| {
        bytes.len() < prefix.len() && bytes.eq_ignore_ascii_case(&prefix[..bytes.len()])
    })
}

fn parse_marker(kind: &[u8], body: &str) -> Marker {
    if kind.eq_ignore_ascii_case(SEED_PREFIX) {
        let Some((category, description)) = body.split_once([':', '：']) else {
            return Marker::Malformed;
        };
        let description = description.trim();
        match SeedCategory::parse(category) {
            Some(category) if !description.is_empty() => Marker::Seed {
                category,
                description: description.to_string(),
            },
            _ => Marker::Malformed,
        }
    } else {
        let tag = body.trim();
        if tag.is_empty() {
            Marker::Malformed
        } else {
            Marker::Mood(tag.to_string())
        }
    }
}

/// Locate every complete marker in `text`.
pub fn find_markers(text: &str) -> Vec<MarkerSpan> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('[') {
        let start = pos + offset;
        let rest = &bytes[start + 1..];
        let kind = if has_prefix_ignore_case(rest, SEED_PREFIX) {
            SEED_PREFIX
        } else if has_prefix_ignore_case(rest, MOOD_PREFIX) {
            MOOD_PREFIX
        } else {
            pos = start + 1;
            continue;
        };

        let body_start = start + 1 + kind.len();
        let Some(close) = text[body_start..].find(']') else {
            break;
        };
        let end = body_start + close + 1;
        spans.push(MarkerSpan {
            start,
            end,
            marker: parse_marker(kind, &text[body_start..body_start + close]),
        });
        pos = end;
    }

    spans
}

/// Seed annotations in `text`, in order of appearance.
pub fn extract_seeds(text: &str) -> Vec<SeedMarker> {
    find_markers(text)
        .into_iter()
        .filter_map(|span| match span.marker {
            Marker::Seed {
                category,
                description,
            } => Some(SeedMarker {
                category,
                description,
            }),
            _ => None,
        })
        .collect()
}

/// Mood tags in `text`, in order of appearance.
pub fn extract_moods(text: &str) -> Vec<String> {
    find_markers(text)
        .into_iter()
        .filter_map(|span| match span.marker {
            Marker::Mood(tag) => Some(tag),
            _ => None,
        })
        .collect()
}

/// Remove markers and tidy the whitespace they leave behind.
///
/// Only lines that held a marker are touched; the rest of the text keeps its
/// formatting apart from surrounding whitespace.
pub fn strip_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cuts = Vec::new();
    let mut pos = 0;
    for span in find_markers(text) {
        out.push_str(&text[pos..span.start]);
        pos = span.end;
        let at_gap = out.is_empty() || out.ends_with([' ', '\n']);
        if at_gap && text[pos..].starts_with(' ') {
            pos += 1;
        }
        cuts.push(out.len());
    }
    out.push_str(&text[pos..]);
    tidy_cut_lines(&out, &cuts).trim().to_string()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Trim lines containing a cut and drop the ones a marker left empty,
/// without doubling the blank lines around them.
fn tidy_cut_lines(text: &str, cuts: &[usize]) -> String {
    if cuts.is_empty() {
        return text.to_string();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut start = 0;
    let mut merge_blank = false;

    for (i, &line) in lines.iter().enumerate() {
        let end = start + line.len();
        let cut = cuts.iter().any(|&at| (start..=end).contains(&at));
        start = end + 1;

        let line = if cut { line.trim_end() } else { line };
        if merge_blank && is_blank(line) {
            continue;
        }
        merge_blank = false;

        if cut && line.is_empty() {
            if kept.last().map_or(true, |prev| is_blank(prev)) {
                merge_blank = true;
                continue;
            }
            if lines.get(i + 1).map_or(true, |next| is_blank(next)) {
                continue;
            }
        }
        kept.push(line);
    }

    kept.join("\n")
}

fn parse_choice_item(line: &str, syntax: &ChoiceSyntax) -> Option<String> {
    let line = line.trim();
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let separator = rest.chars().next()?;
    if !syntax.separators.contains(&separator) {
        return None;
    }
    let item = rest[separator.len_utf8()..].trim();
    (!item.is_empty()).then(|| item.to_string())
}

/// Numbered choices under the last choice header in `text`.
///
/// Returns an empty list when no header is present.
pub fn parse_choices(text: &str, syntax: &ChoiceSyntax) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let Some(header) = lines.iter().rposition(|line| syntax.is_header(line)) else {
        return Vec::new();
    };

    let mut choices = Vec::new();
    for line in &lines[header + 1..] {
        if line.trim().is_empty() {
            continue;
        }
        match parse_choice_item(line, syntax) {
            Some(item) => choices.push(item),
            None => break,
        }
    }
    choices
}

/// Run the full pipeline: collect seeds and moods, strip markers, then
/// parse choices from the cleaned text. The choice block stays in the text.
pub fn process_response(raw: &str, syntax: &ChoiceSyntax) -> Processed {
    let mut seeds = Vec::new();
    let mut moods = Vec::new();
    for span in find_markers(raw) {
        match span.marker {
            Marker::Seed {
                category,
                description,
            } => seeds.push(SeedMarker {
                category,
                description,
            }),
            Marker::Mood(tag) => moods.push(tag),
            Marker::Malformed => {}
        }
    }

    let text = strip_markers(raw);
    let choices = parse_choices(&text, syntax);
    Processed {
        text,
        choices,
        seeds,
        moods,
    }
}

/// Removes markers from a chunked stream as it arrives.
///
/// Text that might be the start of a marker is held back until the marker
/// closes or turns out to be ordinary text.
#[derive(Debug, Clone, Default)]
pub struct LiveFilter {
    pending: String,
}

impl LiveFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the text that is safe to display now.
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut out = String::new();

        loop {
            let Some(start) = self.pending.find('[') else {
                out.push_str(&self.pending);
                self.pending.clear();
                break;
            };
            out.push_str(&self.pending[..start]);
            self.pending.drain(..start);

            let rest = &self.pending.as_bytes()[1..];
            if is_partial_prefix(rest) {
                break;
            }
            if has_prefix_ignore_case(rest, SEED_PREFIX) || has_prefix_ignore_case(rest, MOOD_PREFIX) {
                match self.pending.find(']') {
                    Some(close) => {
                        self.pending.drain(..=close);
                    }
                    None => break,
                }
            } else {
                out.push('[');
                self.pending.drain(..1);
            }
        }

        out
    }

    /// Flush anything held back. An unterminated marker is shown as text.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "The corridor smells of bleach. [MOOD:drone]\n\
        A child's shoe lies by the lift. [SEED:Item:a small red shoe]\n\
        \n\
        Choices:\n\
        1. Pick up the shoe\n\
        2. Call the lift\n";

    #[test]
    fn test_parse_choices_english() {
        let choices = parse_choices("Text.\n\nChoices:\n1. A\n2. B", &ChoiceSyntax::default());
        assert_eq!(choices, vec!["A", "B"]);
    }

    #[test]
    fn test_parse_choices_chinese() {
        let text = "走廊里很安静。\n\n选项：\n1、打开门\n2、离开\n";
        assert_eq!(parse_choices(text, &ChoiceSyntax::default()), vec!["打开门", "离开"]);
    }

    #[test]
    fn test_parse_choices_without_header() {
        let text = "1. This is a list\n2. but not a menu";
        assert!(parse_choices(text, &ChoiceSyntax::default()).is_empty());
    }

    #[test]
    fn test_parse_choices_uses_last_header_and_stops_at_prose() {
        let text = "Options:\n1. stale\n\nMore story.\n\n**Choices:**\n1. Run\n\n2. Hide\nThe lights hum.";
        assert_eq!(parse_choices(text, &ChoiceSyntax::default()), vec!["Run", "Hide"]);
    }

    #[test]
    fn test_parse_choices_custom_syntax() {
        let syntax = ChoiceSyntax::default().with_header("Opciones").with_separator(')');
        let text = "opciones:\n1) Correr\n2) Esconderse";
        assert_eq!(parse_choices(text, &syntax), vec!["Correr", "Esconderse"]);
    }

    #[test]
    fn test_extract_single_item_seed() {
        let seeds = extract_seeds("You pocket it. [SEED:Item:a brass key]");
        assert_eq!(
            seeds,
            vec![SeedMarker {
                category: SeedCategory::Item,
                description: "a brass key".into()
            }]
        );
    }

    #[test]
    fn test_malformed_markers_are_stripped_not_recorded() {
        let text = "A [SEED:weapon:a knife] B [SEED:Item:] C [MOOD: ] D";
        assert!(extract_seeds(text).is_empty());
        assert!(extract_moods(text).is_empty());
        assert_eq!(strip_markers(text), "A B C D");
    }

    #[test]
    fn test_unterminated_marker_is_left_alone() {
        let text = "The note reads [SEED:Item:torn";
        assert!(find_markers(text).is_empty());
        assert_eq!(strip_markers(text), text);
    }

    #[test]
    fn test_lines_without_markers_keep_formatting() {
        let text = "Line one  \nLine two\n\n\n\nLine three [MOOD:hum]\nLast";
        assert_eq!(strip_markers(text), "Line one  \nLine two\n\n\n\nLine three\nLast");
        assert_eq!(strip_markers("Hard  \nbreak"), "Hard  \nbreak");
    }

    #[test]
    fn test_marker_only_line_is_removed() {
        assert_eq!(strip_markers("A\n\n[MOOD:wind]\n\nB"), "A\n\nB");
        assert_eq!(strip_markers("A\n[MOOD:wind]\n\nB"), "A\n\nB");
        assert_eq!(strip_markers("[MOOD:wind]\nA"), "A");
    }

    #[test]
    fn test_ordinary_brackets_survive() {
        assert_eq!(strip_markers("[static] then [MOOD:rain]silence"), "[static] then silence");
    }

    #[test]
    fn test_process_response() {
        let processed = process_response(RESPONSE, &ChoiceSyntax::default());
        assert_eq!(
            processed.text,
            "The corridor smells of bleach.\nA child's shoe lies by the lift.\n\nChoices:\n1. Pick up the shoe\n2. Call the lift"
        );
        assert_eq!(processed.choices, vec!["Pick up the shoe", "Call the lift"]);
        assert_eq!(processed.moods, vec!["drone"]);
        assert_eq!(processed.seeds.len(), 1);
        assert_eq!(processed.seeds[0].category, SeedCategory::Item);
    }

    #[test]
    fn test_chinese_seed_category() {
        let seeds = extract_seeds("[SEED:地点：地下室的铁门]");
        assert_eq!(seeds[0].category, SeedCategory::Location);
        assert_eq!(seeds[0].description, "地下室的铁门");
    }

    #[test]
    fn test_live_filter_across_chunks() {
        let mut filter = LiveFilter::new();
        let mut shown = String::new();
        for chunk in ["The door ", "[SE", "ED:Ev", "ent:a knock] opens", " [x] [MO", "OD:hum]."] {
            shown.push_str(&filter.push(chunk));
        }
        shown.push_str(&filter.finish());
        assert_eq!(shown, "The door  opens [x] .");
    }

    #[test]
    fn test_live_filter_flushes_unterminated_marker() {
        let mut filter = LiveFilter::new();
        assert_eq!(filter.push("end [MOOD:dri"), "end ");
        assert_eq!(filter.finish(), "[MOOD:dri");
    }

    #[test]
    fn test_live_filter_releases_false_prefix() {
        let mut filter = LiveFilter::new();
        assert_eq!(filter.push("[M"), "");
        assert_eq!(filter.push("ap]"), "[Map]");
    }
}
