//! Text-level repairs applied before parsing manuscript XML
//!
//! Manuscript files in the wild carry HTML named entities, bare ampersands and
//! a handful of recurring attribute typos, none of which a conforming XML
//! parser accepts. [`preprocess`] rewrites them into well-formed XML. Running
//! it twice gives the same result as running it once.

/// Lines searched for a misplaced XML declaration
const DECLARATION_SEARCH_LINES: usize = 5;

/// Longest entity name considered when scanning for `&name;`
const MAX_ENTITY_LEN: usize = 32;

/// Literal repairs for malformed attribute sequences seen in deposited files
const POINT_FIXES: &[(&str, &str)] = &[
    ("=\"\"http", "=\"http"),
    ("xlink:href=\" ", "xlink:href=\""),
    ("article-type=research-article", "article-type=\"research-article\""),
    ("pub-id-type=doi", "pub-id-type=\"doi\""),
    ("date-type=received", "date-type=\"received\""),
    ("date-type=accepted", "date-type=\"accepted\""),
    ("\" \"/>", "\"/>"),
];

/// Run every repair in order
pub fn preprocess(input: &str) -> String {
    let hoisted = hoist_declaration(input);
    let escaped = normalize_entities(&hoisted);
    apply_point_fixes(escaped)
}

/// Move an XML declaration found in the first few lines to the very start
///
/// Leading whitespace before the document is dropped either way.
pub fn hoist_declaration(input: &str) -> String {
    let trimmed = input.trim_start();
    if declaration_span(trimmed).map(|(start, _)| start) == Some(0) {
        return trimmed.to_string();
    }

    let search_end = trimmed
        .match_indices('\n')
        .nth(DECLARATION_SEARCH_LINES - 1)
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());

    match declaration_span(&trimmed[..search_end]) {
        Some((start, end)) => {
            let declaration = &trimmed[start..end];
            let rest = format!("{}{}", &trimmed[..start], &trimmed[end..]);
            format!("{}\n{}", declaration, rest.trim_start())
        }
        None => trimmed.to_string(),
    }
}

/// Byte span of the first `<?xml ...?>` declaration in `text`
fn declaration_span(text: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(found) = text[from..].find("<?xml") {
        let start = from + found;
        let after = &text[start + 5..];
        // `<?xml-stylesheet ...?>` is a processing instruction, not a declaration
        if after.starts_with(|c: char| c.is_whitespace()) {
            let close = after.find("?>")?;
            return Some((start, start + 5 + close + 2));
        }
        from = start + 5;
    }
    None
}

/// Rewrite every `&` so the result only contains numeric references
///
/// Numeric references are kept, known named entities are replaced and any
/// other ampersand becomes `&#38;`.
pub fn normalize_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 16);
    let mut rest = input;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        rest = match reference_at(tail) {
            Some((Reference::Numeric, len)) => {
                out.push('&');
                out.push_str(&tail[..len]);
                &tail[len..]
            }
            Some((Reference::Named(replacement), len)) => {
                out.push_str(replacement);
                &tail[len..]
            }
            None => {
                out.push_str("&#38;");
                tail
            }
        };
    }

    out.push_str(rest);
    out
}

enum Reference {
    Numeric,
    Named(&'static str),
}

/// Classify the text after an `&`, returning the consumed length
fn reference_at(tail: &str) -> Option<(Reference, usize)> {
    let end = tail
        .char_indices()
        .take(MAX_ENTITY_LEN + 2)
        .find(|(_, c)| *c == ';')
        .map(|(i, _)| i)?;
    let body = &tail[..end];

    if let Some(numeric) = body.strip_prefix('#') {
        let valid = match numeric.strip_prefix(|c: char| c == 'x' || c == 'X') {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !numeric.is_empty() && numeric.chars().all(|c| c.is_ascii_digit()),
        };
        return valid.then_some((Reference::Numeric, end + 1));
    }

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    named_entity(body).map(|replacement| (Reference::Named(replacement), end + 1))
}

/// Replacement text of a named entity
///
/// The five XML entities map to numeric references so the parser unescapes
/// them itself; everything else maps to the character it names.
pub fn named_entity(name: &str) -> Option<&'static str> {
    let replacement = match name {
        "amp" => "&#38;",
        "lt" => "&#60;",
        "gt" => "&#62;",
        "quot" => "&#34;",
        "apos" => "&#39;",

        "nbsp" => "\u{a0}",
        "ensp" => "\u{2002}",
        "emsp" => "\u{2003}",
        "thinsp" => "\u{2009}",
        "hairsp" => "\u{200a}",
        "zwnj" => "\u{200c}",
        "zwj" => "\u{200d}",
        "lrm" => "\u{200e}",
        "rlm" => "\u{200f}",
        "shy" => "\u{ad}",

        "ndash" => "–",
        "mdash" => "—",
        "hyphen" => "‐",
        "lsquo" => "‘",
        "rsquo" | "rsquor" => "’",
        "sbquo" | "lsquor" => "‚",
        "ldquo" => "“",
        "rdquo" | "rdquor" => "”",
        "bdquo" | "ldquor" => "„",
        "laquo" => "«",
        "raquo" => "»",
        "lsaquo" => "‹",
        "rsaquo" => "›",
        "hellip" => "…",
        "bull" => "•",
        "middot" => "·",
        "prime" => "′",
        "Prime" => "″",
        "dagger" => "†",
        "Dagger" => "‡",
        "sect" => "§",
        "para" => "¶",
        "copy" => "©",
        "reg" => "®",
        "trade" => "™",
        "deg" => "°",
        "permil" => "‰",
        "iexcl" => "¡",
        "iquest" => "¿",
        "cent" => "¢",
        "pound" => "£",
        "yen" => "¥",
        "euro" => "€",

        "times" => "×",
        "divide" => "÷",
        "minus" => "−",
        "plusmn" | "pm" => "±",
        "le" => "≤",
        "ge" => "≥",
        "ne" => "≠",
        "asymp" | "approx" => "≈",
        "sim" => "∼",
        "equiv" => "≡",
        "infin" => "∞",
        "sum" => "∑",
        "prod" => "∏",
        "radic" => "√",
        "part" => "∂",
        "nabla" => "∇",
        "isin" => "∈",
        "notin" => "∉",
        "cap" => "∩",
        "cup" => "∪",
        "sub" => "⊂",
        "sup" => "⊃",
        "and" => "∧",
        "or" => "∨",
        "int" => "∫",
        "prop" => "∝",
        "ang" => "∠",
        "perp" => "⊥",
        "there4" => "∴",
        "micro" => "µ",
        "sup1" => "¹",
        "sup2" => "²",
        "sup3" => "³",
        "frac12" => "½",
        "frac14" => "¼",
        "frac34" => "¾",
        "larr" => "←",
        "rarr" => "→",
        "uarr" => "↑",
        "darr" => "↓",
        "harr" => "↔",
        "rArr" => "⇒",
        "lArr" => "⇐",
        "hArr" => "⇔",

        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" | "epsi" => "ε",
        "zeta" => "ζ",
        "eta" => "η",
        "theta" => "θ",
        "iota" => "ι",
        "kappa" => "κ",
        "lambda" => "λ",
        "mu" => "μ",
        "nu" => "ν",
        "xi" => "ξ",
        "omicron" => "ο",
        "pi" => "π",
        "rho" => "ρ",
        "sigma" => "σ",
        "sigmaf" => "ς",
        "tau" => "τ",
        "upsilon" => "υ",
        "phi" => "φ",
        "chi" => "χ",
        "psi" => "ψ",
        "omega" => "ω",
        "Alpha" => "Α",
        "Beta" => "Β",
        "Gamma" => "Γ",
        "Delta" => "Δ",
        "Theta" => "Θ",
        "Lambda" => "Λ",
        "Pi" => "Π",
        "Sigma" => "Σ",
        "Phi" => "Φ",
        "Psi" => "Ψ",
        "Omega" => "Ω",

        "Agrave" => "À",
        "Aacute" => "Á",
        "Acirc" => "Â",
        "Atilde" => "Ã",
        "Auml" => "Ä",
        "Aring" => "Å",
        "AElig" => "Æ",
        "Ccedil" => "Ç",
        "Egrave" => "È",
        "Eacute" => "É",
        "Ecirc" => "Ê",
        "Euml" => "Ë",
        "Iacute" => "Í",
        "Ntilde" => "Ñ",
        "Oacute" => "Ó",
        "Ouml" => "Ö",
        "Oslash" => "Ø",
        "Uacute" => "Ú",
        "Uuml" => "Ü",
        "szlig" => "ß",
        "agrave" => "à",
        "aacute" => "á",
        "acirc" => "â",
        "atilde" => "ã",
        "auml" => "ä",
        "aring" => "å",
        "aelig" => "æ",
        "ccedil" => "ç",
        "egrave" => "è",
        "eacute" => "é",
        "ecirc" => "ê",
        "euml" => "ë",
        "igrave" => "ì",
        "iacute" => "í",
        "icirc" => "î",
        "iuml" => "ï",
        "ntilde" => "ñ",
        "ograve" => "ò",
        "oacute" => "ó",
        "ocirc" => "ô",
        "otilde" => "õ",
        "ouml" => "ö",
        "oslash" => "ø",
        "ugrave" => "ù",
        "uacute" => "ú",
        "ucirc" => "û",
        "uuml" => "ü",
        "yacute" => "ý",
        "yuml" => "ÿ",
        _ => return None,
    };
    Some(replacement)
}

/// Apply the literal repair table until nothing matches
///
/// A single pass can leave a fresh match behind (`xlink:href="  http` loses
/// only one space), so the table is reapplied until the text is stable.
pub fn apply_point_fixes(mut text: String) -> String {
    loop {
        let mut changed = false;
        for (from, to) in POINT_FIXES {
            while text.contains(from) {
                text = text.replace(from, to);
                changed = true;
            }
        }
        if !changed {
            return text;
        }
    }
}
