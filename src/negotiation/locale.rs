//! Locale negotiation.

/// Choose the locale that answers a request.
///
/// Precedence:
/// 1. `force_locale`, even when the application cannot serve it
/// 2. the first request locale the application supports
/// 3. the first request language that prefixes an application locale
/// 4. `default_locale`, then the first application locale
///
/// Comparisons are case-insensitive and treat `_` like `-`; the returned
/// value uses the application's spelling.
pub fn negotiate_locale(
    request_locales: Option<&[String]>,
    request_languages: Option<&[String]>,
    application_locales: Option<&[String]>,
    default_locale: Option<&str>,
    force_locale: Option<&str>,
) -> String {
    if let Some(forced) = force_locale.map(str::trim).filter(|f| !f.is_empty()) {
        return forced.to_string();
    }

    let app_locales = application_locales.unwrap_or_default();

    for wanted in request_locales.unwrap_or_default() {
        let wanted = normalize(wanted);
        if let Some(found) = app_locales.iter().find(|l| normalize(l) == wanted) {
            return found.clone();
        }
    }

    for language in request_languages.unwrap_or_default() {
        let language = normalize(language);
        if language.is_empty() {
            continue;
        }
        let found = app_locales.iter().find(|l| {
            let l = normalize(l);
            l == language || l.starts_with(&format!("{language}-"))
        });
        if let Some(found) = found {
            return found.clone();
        }
    }

    default_locale
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| app_locales.first().cloned())
        .unwrap_or_default()
}

fn normalize(locale: &str) -> String {
    locale.trim().replace('_', "-").to_ascii_lowercase()
}
