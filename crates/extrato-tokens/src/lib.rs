use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use extrato_core::{SourceError, Token, TokenSource};

/// Layout of a token file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormat {
    /// `{"pages": [[{"text", "x", "y"}, ...], ...]}`
    Paged,
    /// `[{"text", "x", "y", "page"}, ...]`
    Flat,
    /// Output of the `pdf2json` converter: `{"Pages": [{"Texts": [{"x", "y", "R": [{"T"}]}]}]}`,
    /// optionally wrapped in `formImage`. Run text is URL-encoded.
    Pdf2Json,
}

/// JSON-based implementation of [`TokenSource`].
///
/// By default the format is detected from the document's top-level shape;
/// use [`JsonTokenSource::with_format`] to pin it.
#[derive(Debug, Clone, Default)]
pub struct JsonTokenSource {
    format: Option<TokenFormat>,
}

impl JsonTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip detection and always decode as `format`.
    pub fn with_format(mut self, format: TokenFormat) -> Self {
        self.format = Some(format);
        self
    }
}

impl TokenSource for JsonTokenSource {
    fn load_tokens(&self, path: &Path) -> Result<Vec<Token>, SourceError> {
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| SourceError::Decode(format!("{}: {}", path.display(), e)))?;
        let format = match self.format {
            Some(f) => f,
            None => detect_format(&value).ok_or_else(|| {
                SourceError::Decode(format!("{}: unrecognized token layout", path.display()))
            })?,
        };
        decode_value(value, format)
    }
}

/// Guess the token layout from the top-level JSON shape.
pub fn detect_format(value: &Value) -> Option<TokenFormat> {
    match value {
        Value::Array(_) => Some(TokenFormat::Flat),
        Value::Object(map) if map.contains_key("pages") => Some(TokenFormat::Paged),
        Value::Object(map) if map.contains_key("Pages") => Some(TokenFormat::Pdf2Json),
        Value::Object(map) => map
            .get("formImage")
            .filter(|f| f.get("Pages").is_some())
            .map(|_| TokenFormat::Pdf2Json),
        _ => None,
    }
}

/// Decode a token document from a JSON string, detecting its layout.
pub fn decode_tokens(json: &str) -> Result<Vec<Token>, SourceError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| SourceError::Decode(e.to_string()))?;
    let format = detect_format(&value)
        .ok_or_else(|| SourceError::Decode("unrecognized token layout".into()))?;
    decode_value(value, format)
}

#[derive(Deserialize)]
struct RawToken {
    text: String,
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct PagedStream {
    pages: Vec<Vec<RawToken>>,
}

#[derive(Deserialize)]
struct Pdf2JsonDoc {
    #[serde(rename = "Pages")]
    pages: Vec<Pdf2JsonPage>,
}

#[derive(Deserialize)]
struct Pdf2JsonPage {
    #[serde(rename = "Texts", default)]
    texts: Vec<Pdf2JsonText>,
}

#[derive(Deserialize)]
struct Pdf2JsonText {
    x: f64,
    y: f64,
    #[serde(rename = "R", default)]
    runs: Vec<Pdf2JsonRun>,
}

#[derive(Deserialize)]
struct Pdf2JsonRun {
    #[serde(rename = "T")]
    text: String,
}

fn decode_value(value: Value, format: TokenFormat) -> Result<Vec<Token>, SourceError> {
    let bad = |e: serde_json::Error| SourceError::Decode(e.to_string());
    match format {
        TokenFormat::Flat => serde_json::from_value::<Vec<Token>>(value).map_err(bad),
        TokenFormat::Paged => {
            let stream: PagedStream = serde_json::from_value(value).map_err(bad)?;
            Ok(stream
                .pages
                .into_iter()
                .enumerate()
                .flat_map(|(page, tokens)| {
                    tokens
                        .into_iter()
                        .map(move |t| Token::new(t.text, t.x, t.y, page))
                })
                .collect())
        }
        TokenFormat::Pdf2Json => {
            let value = match value {
                Value::Object(mut map) if !map.contains_key("Pages") => {
                    map.remove("formImage").unwrap_or(Value::Null)
                }
                other => other,
            };
            let doc: Pdf2JsonDoc = serde_json::from_value(value).map_err(bad)?;
            Ok(doc
                .pages
                .into_iter()
                .enumerate()
                .flat_map(|(page, p)| {
                    p.texts.into_iter().map(move |t| {
                        let text: String = t.runs.iter().map(|r| decode_run(&r.text)).collect();
                        Token::new(text, t.x, t.y, page)
                    })
                })
                .collect())
        }
    }
}

/// pdf2json percent-encodes run text; fall back to the raw text when the
/// escape sequence is malformed.
fn decode_run(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_paged() {
        let json = r#"{"pages": [
            [{"text": "01", "x": 1.0, "y": 5.0}],
            [{"text": "02", "x": 1.0, "y": 2.0}]
        ]}"#;
        let tokens = decode_tokens(json).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].page, 0);
        assert_eq!(tokens[1].page, 1);
        assert_eq!(tokens[1].text, "02");
    }

    #[test]
    fn test_decode_flat_defaults_page() {
        let json = r#"[{"text": "A", "x": 0.5, "y": 1.0}, {"text": "B", "x": 0.5, "y": 1.0, "page": 3}]"#;
        let tokens = decode_tokens(json).unwrap();
        assert_eq!(tokens[0].page, 0);
        assert_eq!(tokens[1].page, 3);
    }

    #[test]
    fn test_decode_pdf2json_url_encoded() {
        let json = r#"{"Pages": [{"Texts": [
            {"x": 2.1, "y": 4.3, "R": [{"T": "BULK%20BOLIVIA%20(PORTO"}]},
            {"x": 9.0, "y": 4.3, "R": [{"T": "1.439%2C07"}]}
        ]}]}"#;
        let tokens = decode_tokens(json).unwrap();
        assert_eq!(tokens[0].text, "BULK BOLIVIA (PORTO");
        assert_eq!(tokens[1].text, "1.439,07");
        assert_eq!(tokens[1].x, 9.0);
    }

    #[test]
    fn test_decode_pdf2json_form_image_wrapper() {
        let json = r#"{"formImage": {"Pages": [{"Texts": [
            {"x": 1.0, "y": 1.0, "R": [{"T": "FOLHAS%2FCOMPLEMENTOS"}]}
        ]}]}}"#;
        let tokens = decode_tokens(json).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "FOLHAS/COMPLEMENTOS");
    }

    #[test]
    fn test_malformed_escape_kept_raw() {
        assert_eq!(decode_run("100%"), "100%");
    }

    #[test]
    fn test_unrecognized_layout() {
        assert!(matches!(
            decode_tokens(r#"{"foo": 1}"#),
            Err(SourceError::Decode(_))
        ));
    }

    #[test]
    fn test_source_reads_file_with_pinned_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"[{"text": "X", "x": 1.0, "y": 2.0, "page": 0}]"#).unwrap();
        let source = JsonTokenSource::new().with_format(TokenFormat::Flat);
        let tokens = source.load_tokens(&path).unwrap();
        assert_eq!(tokens, vec![Token::new("X", 1.0, 2.0, 0)]);
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        assert!(matches!(
            decode_tokens("[{\"text\": "),
            Err(SourceError::Decode(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonTokenSource::new().load_tokens(&path).unwrap_err();
        match err {
            SourceError::Decode(msg) => assert!(msg.contains("broken.json")),
            other => panic!("expected Decode, got {:?}", other),
        }
    }

    #[test]
    fn test_source_missing_file_is_io_error() {
        let source = JsonTokenSource::new();
        let err = source
            .load_tokens(Path::new("/nonexistent/tokens.json"))
            .unwrap_err();
        assert!(matches!(err, SourceError::Io(_)));
    }
}
