//! Quality-list header parsing (`Accept`, `Accept-Language`).

/// One entry of a quality list.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityItem {
    pub value: String,
    pub quality: f32,
}

/// Parse a header such as `text/html;q=0.9, application/json` into entries
/// ordered by descending quality. Ties keep header order; `q=0` entries are
/// dropped and an unreadable `q` counts as `1`.
pub fn parse_quality_list(header: &str) -> Vec<QualityItem> {
    let mut items: Vec<QualityItem> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let value = pieces.next()?.trim();
            if value.is_empty() {
                return None;
            }
            let quality = pieces
                .filter_map(|p| {
                    let (k, v) = p.split_once('=')?;
                    let parsed = v.trim().parse::<f32>().ok().filter(|q| q.is_finite());
                    (k.trim().eq_ignore_ascii_case("q")).then(|| parsed.unwrap_or(1.0))
                })
                .next()
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);
            (quality > 0.0).then(|| QualityItem {
                value: value.to_string(),
                quality,
            })
        })
        .collect();

    // stable: equal qualities keep header order
    items.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    items
}

/// Values of a quality list, most preferred first.
pub fn preferred_values(header: &str) -> Vec<String> {
    parse_quality_list(header)
        .into_iter()
        .map(|item| item.value)
        .collect()
}

/// Split `Accept-Language` into full locales (`pt-BR`) and bare languages
/// (`pt`), both in preference order. Every locale also contributes its
/// language; `*` is ignored.
pub fn split_language_tags(header: &str) -> (Vec<String>, Vec<String>) {
    let mut locales = Vec::new();
    let mut languages: Vec<String> = Vec::new();

    for item in parse_quality_list(header) {
        let tag = item.value.replace('_', "-");
        if tag == "*" {
            continue;
        }
        let language = tag
            .split('-')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if tag.contains('-') {
            locales.push(tag);
        }
        if !language.is_empty() && !languages.contains(&language) {
            languages.push(language);
        }
    }

    (locales, languages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_quality_keeping_ties_stable() {
        let items = preferred_values("text/plain;q=0.5, text/html, application/json, */*;q=0.1");
        assert_eq!(items, vec!["text/html", "application/json", "text/plain", "*/*"]);
    }

    #[test]
    fn drops_zero_quality_and_tolerates_garbage() {
        let items = parse_quality_list("a;q=0, b;q=abc, , c;level=1;q=0.2");
        let values: Vec<_> = items.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["b", "c"]);
        assert_eq!(items[0].quality, 1.0);
    }

    #[test]
    fn non_finite_quality_counts_as_one() {
        let items = parse_quality_list("a;q=0.3, b;q=NaN, c;q=inf");
        let values: Vec<_> = items.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["b", "c", "a"]);
        assert!(items.iter().all(|i| i.quality.is_finite()));
    }

    #[test]
    fn splits_locales_from_languages() {
        let (locales, languages) = split_language_tags("pt-BR, en_US;q=0.8, fr;q=0.5, *;q=0.1");
        assert_eq!(locales, vec!["pt-BR", "en-US"]);
        assert_eq!(languages, vec!["pt", "en", "fr"]);
    }
}
