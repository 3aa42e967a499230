//! Retrieval stage: search URL construction, fetch, charset detection, HTML reduction.

use std::num::NonZeroUsize;
use termlens_core::{
    ComprehensionError, Error, FetchBackend, FetchRequest, HtmlToText, KeywordList,
};
use url::Url;

use crate::charset::{self, DetectedCharset};

/// Fixed search surface. Not configurable: its query shape is part of the contract.
pub const SEARCH_ENDPOINT: &str = "https://www.google.com/search";

/// Build the search URL for `keywords`.
///
/// `q` is the keywords joined by single spaces, `num` the result limit, `ie`/`oe` pin the
/// request and response encodings to UTF-8, and `hl` carries the language hint if any.
pub fn build_search_url(
    keywords: &KeywordList,
    limit: NonZeroUsize,
    locale: Option<&str>,
) -> Result<Url, ComprehensionError> {
    let term = keywords.join(" ");
    let limit = limit.to_string();
    let mut params: Vec<(&str, &str)> = vec![
        ("q", term.as_str()),
        ("num", limit.as_str()),
        ("ie", "UTF-8"),
        ("oe", "UTF-8"),
    ];
    if let Some(hl) = locale.map(str::trim).filter(|s| !s.is_empty()) {
        params.push(("hl", hl));
    }
    Url::parse_with_params(SEARCH_ENDPOINT, &params)
        .map_err(|e| ComprehensionError::InvalidUrl(e.to_string()))
}

/// Language subtag of a POSIX locale string (`ja_JP.UTF-8` → `ja`).
pub fn language_hint(locale: &str) -> Option<String> {
    let lang = locale
        .split(['_', '.', '@', '-'])
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if lang.is_empty() || lang == "c" || lang == "posix" {
        return None;
    }
    if !lang.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(lang)
}

/// Language hint for the current process, from `LC_ALL`, `LC_MESSAGES`, then `LANG`.
pub fn locale_hint_from_env() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .find_map(|k| crate::env(k))
        .and_then(|v| language_hint(&v))
}

/// What the retrieval stage produced, with the charset decision kept for tracing.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub text: String,
    pub charset: DetectedCharset,
    pub status: u16,
}

/// Fetch `url` once and reduce the page to plain text.
pub async fn fetch_evidence(
    transport: &dyn FetchBackend,
    converter: &dyn HtmlToText,
    url: &Url,
) -> Result<Evidence, ComprehensionError> {
    let resp = transport
        .fetch(&FetchRequest::get(url.as_str()))
        .await
        .map_err(|e| match e {
            Error::InvalidUrl(d) => ComprehensionError::InvalidUrl(d),
            other => ComprehensionError::SearchFailed {
                status: None,
                detail: other.to_string(),
            },
        })?;

    if !resp.is_success() {
        return Err(ComprehensionError::SearchFailed {
            status: Some(resp.status),
            detail: format!("search HTTP {}", resp.status),
        });
    }

    let detected = charset::detect(resp.content_type(), &resp.bytes);
    let html = charset::decode(&resp.bytes, detected.encoding)
        .map_err(ComprehensionError::ContentExtractionFailed)?;

    Ok(Evidence {
        text: converter.to_plain_text(&html),
        charset: detected,
        status: resp.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use termlens_core::FetchResponse;

    fn kw(words: &[&str]) -> KeywordList {
        KeywordList::from_extracted(words.iter().map(|s| s.to_string()).collect(), "x").unwrap()
    }

    fn params(u: &Url) -> BTreeMap<String, String> {
        u.query_pairs().into_owned().collect()
    }

    #[test]
    fn search_url_carries_term_limit_and_utf8_declarations() {
        let u = build_search_url(
            &kw(&["quantum", "entanglement", "physics"]),
            NonZeroUsize::new(10).unwrap(),
            Some("ja"),
        )
        .unwrap();
        assert_eq!(u.host_str(), Some("www.google.com"));
        assert_eq!(u.path(), "/search");
        let p = params(&u);
        assert_eq!(p["q"], "quantum entanglement physics");
        assert_eq!(p["num"], "10");
        assert_eq!(p["ie"], "UTF-8");
        assert_eq!(p["oe"], "UTF-8");
        assert_eq!(p["hl"], "ja");
    }

    #[test]
    fn search_url_omits_locale_hint_when_unresolved() {
        let u = build_search_url(&kw(&["量子"]), NonZeroUsize::new(3).unwrap(), None).unwrap();
        let p = params(&u);
        assert_eq!(p["q"], "量子");
        assert!(!p.contains_key("hl"));
        let u = build_search_url(&kw(&["a b"]), NonZeroUsize::new(3).unwrap(), Some("  ")).unwrap();
        assert!(!params(&u).contains_key("hl"));
    }

    #[test]
    fn language_hint_parses_posix_locales() {
        assert_eq!(language_hint("ja_JP.UTF-8").as_deref(), Some("ja"));
        assert_eq!(language_hint("en_US").as_deref(), Some("en"));
        assert_eq!(language_hint("de").as_deref(), Some("de"));
        assert_eq!(language_hint("sr_RS@latin").as_deref(), Some("sr"));
        assert_eq!(language_hint("C"), None);
        assert_eq!(language_hint("POSIX"), None);
        assert_eq!(language_hint("C.UTF-8"), None);
        assert_eq!(language_hint(""), None);
    }

    proptest! {
        #[test]
        fn search_url_limit_and_encoding_params_are_fixed(
            words in prop::collection::vec("[^\\s]{1,12}", 1..6),
            limit in 1usize..500,
        ) {
            let list = KeywordList::from_extracted(words.clone(), "q").unwrap();
            let u = build_search_url(&list, NonZeroUsize::new(limit).unwrap(), None).unwrap();
            let p = params(&u);
            prop_assert_eq!(p.get("num").cloned(), Some(limit.to_string()));
            prop_assert_eq!(p.get("ie").map(String::as_str), Some("UTF-8"));
            prop_assert_eq!(p.get("oe").map(String::as_str), Some("UTF-8"));
            prop_assert_eq!(p.get("q").cloned(), Some(list.join(" ")));
        }
    }

    struct Canned(FetchResponse);

    #[async_trait::async_trait]
    impl FetchBackend for Canned {
        async fn fetch(&self, _req: &FetchRequest) -> termlens_core::Result<FetchResponse> {
            Ok(self.0.clone())
        }
    }

    fn canned(status: u16, content_type: Option<&str>, bytes: Vec<u8>) -> Canned {
        Canned(FetchResponse {
            url: SEARCH_ENDPOINT.to_string(),
            final_url: SEARCH_ENDPOINT.to_string(),
            status,
            content_type: content_type.map(str::to_string),
            headers: BTreeMap::new(),
            bytes,
        })
    }

    #[tokio::test]
    async fn fetch_evidence_decodes_with_header_charset() {
        let (sjis, _, _) = encoding_rs::SHIFT_JIS.encode("<p>量子もつれ</p>");
        let mut body = b"<meta charset=\"utf-8\">".to_vec();
        body.extend_from_slice(&sjis);
        let t = canned(200, Some("text/html; charset=Shift_JIS"), body);
        let url = Url::parse(SEARCH_ENDPOINT).unwrap();

        let ev = fetch_evidence(&t, &crate::extract::Html2TextConverter::default(), &url)
            .await
            .unwrap();
        assert!(ev.text.contains("量子もつれ"), "{}", ev.text);
        assert_eq!(ev.charset.source, charset::CharsetSource::Header);
    }

    #[tokio::test]
    async fn fetch_evidence_decodes_euc_jp_from_meta_declaration() {
        let html = "<html><head><meta http-equiv=\"Content-Type\" \
                    content=\"text/html; charset=EUC-JP\"></head>\
                    <body><p>量子もつれ</p></body></html>";
        let (euc, _, unmappable) = encoding_rs::EUC_JP.encode(html);
        assert!(!unmappable);
        let t = canned(200, Some("text/html"), euc.into_owned());
        let url = Url::parse(SEARCH_ENDPOINT).unwrap();

        let ev = fetch_evidence(&t, &crate::extract::Html2TextConverter::default(), &url)
            .await
            .unwrap();
        assert!(ev.text.contains("量子もつれ"), "{}", ev.text);
        assert_eq!(ev.charset.encoding, encoding_rs::EUC_JP);
        assert_eq!(ev.charset.source, charset::CharsetSource::Meta);
    }

    #[tokio::test]
    async fn fetch_evidence_decodes_iso_2022_jp_from_header() {
        let (jis, _, unmappable) = encoding_rs::ISO_2022_JP.encode("<p>量子もつれ</p>");
        assert!(!unmappable);
        let t = canned(200, Some("text/html; charset=ISO-2022-JP"), jis.into_owned());
        let url = Url::parse(SEARCH_ENDPOINT).unwrap();

        let ev = fetch_evidence(&t, &crate::extract::Html2TextConverter::default(), &url)
            .await
            .unwrap();
        assert!(ev.text.contains("量子もつれ"), "{}", ev.text);
        assert_eq!(ev.charset.encoding, encoding_rs::ISO_2022_JP);
        assert_eq!(ev.charset.source, charset::CharsetSource::Header);
    }

    #[tokio::test]
    async fn fetch_evidence_maps_non_success_status() {
        let t = canned(503, Some("text/html"), b"busy".to_vec());
        let url = Url::parse(SEARCH_ENDPOINT).unwrap();
        let err = fetch_evidence(&t, &crate::extract::Html2TextConverter::default(), &url)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "search_failed");
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn fetch_evidence_fails_on_undecodable_body() {
        let t = canned(200, Some("text/html; charset=utf-8"), vec![0xff, 0xfe, 0xfd]);
        let url = Url::parse(SEARCH_ENDPOINT).unwrap();
        let err = fetch_evidence(&t, &crate::extract::Html2TextConverter::default(), &url)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ComprehensionError::ContentExtractionFailed(_)),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn empty_page_is_valid_evidence() {
        let t = canned(204, None, Vec::new());
        let url = Url::parse(SEARCH_ENDPOINT).unwrap();
        let ev = fetch_evidence(&t, &crate::extract::Html2TextConverter::default(), &url)
            .await
            .unwrap();
        assert!(ev.text.trim().is_empty());
    }
}
