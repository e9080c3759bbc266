//! Structural reference extraction.
//!
//! Legal manuals are organised as títulos, capítulos and artículos, and
//! users ask about them directly ("¿Qué dice el artículo 52?"). The
//! resolver recognises those locators in free text so the coordinator can
//! answer with an exact metadata lookup before falling back to vector
//! similarity.
//!
//! Matching runs on accent-folded, lowercased text, so "ARTÍCULO",
//! "articulo" and "Artículo" are the same keyword.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use crate::text_util::fold;

/// Highest numeral accepted for títulos and capítulos.
///
/// Keeps common Spanish words made of roman digits ("mi", "di", "mil")
/// from being read as numerals.
const MAX_SECTION_NUMERAL: u32 = 50;

static ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?P<kw>articulos|articulo|articles|article|arts|art)\.?\s*(?:(?:no|nro|num|numero)\.?\s*|n[°º]\s*)?(?P<nums>\d+(?:\s*(?:,|y|e|and|&)\s*\d+)*)",
    )
    .expect("article pattern is valid")
});

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:titulos|titulo|titles|title)\s+(?P<num>\d+|[ivxlcdm]+)\b")
        .expect("title pattern is valid")
});

static CHAPTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:capitulos|capitulo|chapters|chapter|cap\.)\s*(?P<num>\d+|[ivxlcdm]+)\b",
    )
    .expect("chapter pattern is valid")
});

static LOCATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<loc>(?i:art[íi]culo|art\.?|t[íi]tulo|cap[íi]tulo)\s*(?:\d+|[ivxlcdmIVXLCDM]+))(?:[^\p{L}\d]|$)",
    )
    .expect("locator pattern is valid")
});

/// The structural unit a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StructuralKind {
    Title,
    Chapter,
    Article,
}

impl StructuralKind {
    /// Metadata key holding this kind's label.
    pub fn field(self) -> &'static str {
        match self {
            StructuralKind::Title => "title",
            StructuralKind::Chapter => "chapter",
            StructuralKind::Article => "article",
        }
    }

    pub const ALL: [StructuralKind; 3] = [
        StructuralKind::Title,
        StructuralKind::Chapter,
        StructuralKind::Article,
    ];
}

impl std::fmt::Display for StructuralKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field())
    }
}

/// A locator extracted from a query, e.g. `{kind: article, value: "52"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuralReference {
    pub kind: StructuralKind,
    /// Canonical numeral: arabic without leading zeros, or upper-case
    /// roman.
    pub value: String,
    /// The numeral as it appeared in the query, upper-cased.
    pub written: String,
}

impl StructuralReference {
    pub fn new(kind: StructuralKind, written: &str) -> Self {
        let written = written.trim().to_uppercase();
        let value = canonical_numeral(&written);
        Self {
            kind,
            value,
            written,
        }
    }

    /// Exact label spellings to try against stored metadata, in order.
    ///
    /// This is a fixed list rather than a fuzzy rule:
    ///
    /// - articles: `Artículo`, `ARTÍCULO`, `artículo`, `Articulo`,
    ///   `ARTICULO`, `articulo`, `Art.`, `ART.`, `Art`, or the bare number;
    ///   each with the canonical number, its zero-padded form when it is a
    ///   single digit, and the number as written.
    /// - títulos: `Título`, `TÍTULO`, `Titulo`, `TITULO`, or bare.
    /// - capítulos: `Capítulo`, `CAPÍTULO`, `Capitulo`, `CAPITULO`, or bare.
    ///
    /// Títulos and capítulos accept both the arabic and the roman numeral
    /// (1 to 50).
    pub fn variants(&self) -> Vec<String> {
        let prefixes: &[&str] = match self.kind {
            StructuralKind::Article => &[
                "Artículo ",
                "ARTÍCULO ",
                "artículo ",
                "Articulo ",
                "ARTICULO ",
                "articulo ",
                "Art. ",
                "ART. ",
                "Art ",
                "",
            ],
            StructuralKind::Title => {
                &["Título ", "TÍTULO ", "Titulo ", "TITULO ", ""]
            }
            StructuralKind::Chapter => {
                &["Capítulo ", "CAPÍTULO ", "Capitulo ", "CAPITULO ", ""]
            }
        };

        let mut numbers = vec![self.value.clone()];
        match self.kind {
            StructuralKind::Article => {
                if self.value.len() == 1 {
                    numbers.push(format!("0{}", self.value));
                }
            }
            StructuralKind::Title | StructuralKind::Chapter => {
                if let Ok(n) = self.value.parse::<u32>() {
                    if let Some(roman) = to_roman(n) {
                        numbers.push(roman);
                    }
                } else if let Some(n) = from_roman(&self.value) {
                    numbers.push(n.to_string());
                }
            }
        }
        numbers.push(self.written.clone());

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(prefixes.len() * numbers.len());
        for number in &numbers {
            for prefix in prefixes {
                let candidate = format!("{prefix}{number}");
                if seen.insert(candidate.clone()) {
                    out.push(candidate);
                }
            }
        }
        out
    }
}

impl std::fmt::Display for StructuralReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.value)
    }
}

/// Extract structural references from free query text.
///
/// References come back in the order they appear in the query, without
/// duplicates. No match is an empty vector, not an error.
///
/// # Examples
///
/// ```
/// use lexbert::resolver::{resolve, StructuralKind};
///
/// let refs = resolve("¿Qué dice el ARTÍCULO 52 del capítulo ii?");
/// assert_eq!(refs.len(), 2);
/// assert_eq!(refs[0].kind, StructuralKind::Article);
/// assert_eq!(refs[0].value, "52");
/// assert_eq!(refs[1].kind, StructuralKind::Chapter);
/// assert_eq!(refs[1].value, "II");
///
/// assert!(resolve("¿cuáles son los deberes del estudiante?").is_empty());
/// ```
pub fn resolve(query: &str) -> Vec<StructuralReference> {
    let folded = fold(query);
    let mut found: Vec<(usize, StructuralReference)> = Vec::new();

    for caps in ARTICLE_RE.captures_iter(&folded) {
        let (Some(kw), Some(nums)) = (caps.name("kw"), caps.name("nums")) else {
            continue;
        };
        let plural = kw.as_str().ends_with('s');
        let numbers = nums
            .as_str()
            .split(|c: char| !c.is_ascii_digit())
            .filter(|s| !s.is_empty());
        for (i, number) in numbers.enumerate() {
            if i > 0 && !plural {
                break;
            }
            found.push((
                nums.start() + i,
                StructuralReference::new(StructuralKind::Article, number),
            ));
        }
    }

    for (re, kind) in [
        (&*TITLE_RE, StructuralKind::Title),
        (&*CHAPTER_RE, StructuralKind::Chapter),
    ] {
        for caps in re.captures_iter(&folded) {
            let Some(num) = caps.name("num") else {
                continue;
            };
            if !is_section_numeral(num.as_str()) {
                continue;
            }
            found.push((
                num.start(),
                StructuralReference::new(kind, num.as_str()),
            ));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|(_, r)| r)
        .filter(|r| seen.insert((r.kind, r.value.clone())))
        .collect()
}

/// The leading locator of a stored structural label.
///
/// Ingested labels are often whole heading lines
/// ("ARTÍCULO 52. DE LOS DEBERES"); the store indexes the locator prefix
/// ("ARTÍCULO 52") alongside the full label so exact lookups still land.
pub fn leading_locator(label: &str) -> Option<&str> {
    let caps = LOCATOR_RE.captures(label)?;
    let loc = caps.name("loc")?.as_str();
    (loc != label.trim()).then_some(loc)
}

fn is_section_numeral(num: &str) -> bool {
    if let Ok(n) = num.parse::<u32>() {
        return n >= 1;
    }
    from_roman(&num.to_uppercase()).is_some_and(|n| n <= MAX_SECTION_NUMERAL)
}

fn canonical_numeral(written: &str) -> String {
    if written.chars().all(|c| c.is_ascii_digit()) {
        let trimmed = written.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        written.to_string()
    }
}

const ROMAN_TABLE: [(u32, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

fn to_roman(mut n: u32) -> Option<String> {
    if n == 0 || n > MAX_SECTION_NUMERAL {
        return None;
    }
    let mut out = String::new();
    for (value, digits) in ROMAN_TABLE {
        while n >= value {
            out.push_str(digits);
            n -= value;
        }
    }
    Some(out)
}

/// Parse an upper-case roman numeral, accepting only canonical spellings.
fn from_roman(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let digit = |c: char| -> Option<i64> {
        match c {
            'I' => Some(1),
            'V' => Some(5),
            'X' => Some(10),
            'L' => Some(50),
            'C' => Some(100),
            'D' => Some(500),
            'M' => Some(1000),
            _ => None,
        }
    };
    let values: Vec<i64> = s.chars().map(digit).collect::<Option<_>>()?;
    let mut total = 0i64;
    for (i, v) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(next) if next > v => total -= v,
            _ => total += v,
        }
    }
    let total = u32::try_from(total).ok()?;
    to_roman(total)
        .filter(|canonical| canonical == s)
        .map(|_| total)
}
