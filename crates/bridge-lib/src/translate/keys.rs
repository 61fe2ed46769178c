//! Variable key normalization

/// Symbols and letters spelled out or folded before filtering
const CHAR_MAP: &[(char, &str)] = &[
    ('$', "dollar"),
    ('%', "percent"),
    ('&', "and"),
    ('<', "less"),
    ('>', "greater"),
    ('|', "or"),
    ('¢', "cent"),
    ('£', "pound"),
    ('¤', "currency"),
    ('¥', "yen"),
    ('©', "(c)"),
    ('®', "(r)"),
    ('€', "euro"),
    ('ß', "ss"),
    ('à', "a"),
    ('á', "a"),
    ('â', "a"),
    ('ä', "a"),
    ('å', "a"),
    ('ç', "c"),
    ('è', "e"),
    ('é', "e"),
    ('ê', "e"),
    ('ë', "e"),
    ('ì', "i"),
    ('í', "i"),
    ('î', "i"),
    ('ï', "i"),
    ('ñ', "n"),
    ('ò', "o"),
    ('ó', "o"),
    ('ô', "o"),
    ('ö', "o"),
    ('ø', "o"),
    ('ù', "u"),
    ('ú', "u"),
    ('û', "u"),
    ('ü', "u"),
    ('Ä', "A"),
    ('Å', "A"),
    ('Ç', "C"),
    ('É', "E"),
    ('Ñ', "N"),
    ('Ö', "O"),
    ('Ü', "U"),
];

/// Separator placed between words of a key
const SEPARATOR: char = '_';

fn is_kept(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c.is_whitespace()
        || matches!(
            c,
            '$' | '*' | '_' | '+' | '~' | '.' | '(' | ')' | '\'' | '"' | '!' | '-' | ':' | '@'
        )
}

/// Turn a variable path like `spec/components/0/replicas` into a key
///
/// `/` becomes `_`, then the name is slugified with `_` as separator:
/// mapped symbols are spelled out (`$` is `dollar`), characters outside
/// `[A-Za-z0-9\s$*_+~.()'"!:@-]` are dropped, existing separators count as
/// spaces, and trimmed whitespace runs collapse into one `_`.
pub fn normalize_key(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c == '/' { SEPARATOR } else { c };
        match CHAR_MAP.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => slug.extend(to.chars().filter(|c| is_kept(*c))),
            None if c == SEPARATOR => slug.push(' '),
            None if is_kept(c) => slug.push(c),
            None => {}
        }
    }

    slug.split_whitespace()
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// Last `/`-separated segment of a variable path
pub fn meaning_of(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_separators() {
        assert_eq!(normalize_key("gpu/count"), "gpu_count");
        assert_eq!(
            normalize_key("spec/components/0/properties/cpu"),
            "spec_components_0_properties_cpu"
        );
    }

    #[test]
    fn test_whitespace_and_symbols() {
        assert_eq!(normalize_key("  memory limit (MB) "), "memory_limit_(MB)");
        assert_eq!(normalize_key("a  b"), "a_b");
        assert_eq!(normalize_key("price$"), "pricedollar");
        assert_eq!(normalize_key("cpu%"), "cpupercent");
        assert_eq!(normalize_key("a#b"), "ab");
        assert_eq!(normalize_key("café"), "cafe");
    }

    #[test]
    fn test_separators_collapse() {
        assert_eq!(normalize_key("a_/b"), "a_b");
        assert_eq!(normalize_key("_leading/trailing_"), "leading_trailing");
        assert_eq!(
            normalize_key("application_deployment_price"),
            "application_deployment_price"
        );
    }

    #[test]
    fn test_case_is_preserved() {
        assert_eq!(normalize_key("Web/Replicas"), "Web_Replicas");
    }

    #[test]
    fn test_meaning() {
        assert_eq!(meaning_of("gpu/count"), "count");
        assert_eq!(meaning_of("replicas"), "replicas");
    }
}
