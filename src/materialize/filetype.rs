//! Declared-versus-actual file type verification.
//!
//! The declared type comes from the extension of the original upload name.
//! The actual type is sniffed from leading magic bytes; when nothing matches,
//! two heuristics apply: CSV (the first few non-empty lines split into the
//! same number of comma-separated fields) and plain text (every byte is
//! printable ASCII or whitespace). Both heuristics are approximations.

use std::path::Path;
use tokio::io::AsyncReadExt;

/// Number of leading bytes inspected.
pub const HEAD_LEN: usize = 4100;

/// Number of non-empty lines the CSV heuristic compares.
pub const CSV_SAMPLE_LINES: usize = 5;

/// MIME type used when the extension is unknown.
pub const UNKNOWN_TYPE: &str = "application/octet-stream";

const CFB: &str = "application/x-cfb";
const ZIP: &str = "application/zip";
const TEXT: &str = "text/plain";
const CSV: &str = "text/csv";

/// Extensions of the legacy Office formats, stored in a CFB container.
const OLE_EXTENSIONS: &[&str] = &["doc", "xls", "ppt"];

/// Extensions of the Office Open XML formats, stored in a zip container.
const OOXML_EXTENSIONS: &[&str] = &["docx", "xlsx", "pptx"];

/// Returns the MIME type registered for `ext`.
fn mime_for(ext: &str) -> &'static str {
    mime_guess::from_ext(ext).first_raw().unwrap_or(UNKNOWN_TYPE)
}

fn in_family(extensions: &[&str], mime: &str) -> bool {
    mime != UNKNOWN_TYPE && extensions.iter().any(|ext| mime_for(ext) == mime)
}

/// Returns the MIME type implied by `filename`'s extension.
pub fn declared_type(filename: &str) -> &'static str {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(UNKNOWN_TYPE)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn refine_zip(head: &[u8]) -> &'static str {
    if contains(head, b"word/") {
        mime_for("docx")
    } else if contains(head, b"xl/") {
        mime_for("xlsx")
    } else if contains(head, b"ppt/") {
        mime_for("pptx")
    } else {
        ZIP
    }
}

/// Identifies a type from magic bytes.
pub fn sniff(head: &[u8]) -> Option<&'static str> {
    let starts = |magic: &[u8]| head.starts_with(magic);

    if starts(b"%PDF-") {
        Some(mime_for("pdf"))
    } else if starts(b"\x89PNG\r\n\x1a\n") {
        Some(mime_for("png"))
    } else if starts(b"\xff\xd8\xff") {
        Some(mime_for("jpg"))
    } else if starts(b"GIF87a") || starts(b"GIF89a") {
        Some(mime_for("gif"))
    } else if starts(b"II*\0") || starts(b"MM\0*") {
        Some(mime_for("tiff"))
    } else if starts(b"RIFF") && head.get(8..12) == Some(b"WEBP".as_slice()) {
        Some(mime_for("webp"))
    } else if head.get(4..12) == Some(b"ftypheic".as_slice()) {
        Some(mime_for("heic"))
    } else if starts(b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1") {
        Some(CFB)
    } else if starts(b"PK\x03\x04") {
        Some(refine_zip(head))
    } else if starts(b"\x1f\x8b") {
        Some(mime_for("gz"))
    } else if starts(b"7z\xbc\xaf\x27\x1c") {
        Some(mime_for("7z"))
    } else if starts(b"Rar!\x1a\x07") {
        Some(mime_for("rar"))
    } else if starts(b"{\\rtf") {
        Some(mime_for("rtf"))
    } else if starts(b"MZ") {
        Some(mime_for("exe"))
    } else if starts(b"\x7fELF") {
        Some("application/x-elf")
    } else {
        None
    }
}

fn strip_bom(head: &[u8]) -> &[u8] {
    head.strip_prefix(b"\xef\xbb\xbf".as_slice()).unwrap_or(head)
}

/// Returns `true` if the sampled lines all have the same nonzero field count.
///
/// When `truncated` is set the final, possibly partial, line is ignored.
pub fn looks_like_csv(head: &[u8], truncated: bool) -> bool {
    let text = String::from_utf8_lossy(strip_bom(head));
    let mut lines: Vec<&str> = text.split('\n').collect();
    if truncated && lines.len() > 1 {
        lines.pop();
    }

    let counts: Vec<usize> = lines
        .iter()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .take(CSV_SAMPLE_LINES)
        .map(|line| line.split(',').count())
        .collect();

    match counts.first() {
        Some(&first) => first > 0 && counts.iter().all(|&c| c == first),
        None => false,
    }
}

/// Returns `true` if every byte is printable ASCII or whitespace.
pub fn looks_like_text(head: &[u8]) -> bool {
    strip_bom(head)
        .iter()
        .all(|&b| matches!(b, 0x20..=0x7e | b'\t' | b'\n' | b'\r' | 0x0c))
}

/// Determines the actual type of content from its leading bytes.
pub fn detect(head: &[u8], truncated: bool) -> Option<&'static str> {
    sniff(head).or_else(|| {
        if looks_like_csv(head, truncated) && looks_like_text(head) {
            Some(CSV)
        } else if looks_like_text(head) {
            Some(TEXT)
        } else {
            None
        }
    })
}

fn is_textual(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime.ends_with("+xml")
        || mime.ends_with("+json")
        || matches!(mime, "application/json" | "application/xml" | "application/javascript")
}

/// Returns `true` if detected content is acceptable for the declared type.
pub fn types_agree(declared: &str, detected: Option<&str>) -> bool {
    if declared == UNKNOWN_TYPE {
        return true;
    }
    let Some(detected) = detected else {
        return false;
    };
    if declared == detected {
        return true;
    }
    match detected {
        CFB => in_family(OLE_EXTENSIONS, declared),
        ZIP => in_family(OOXML_EXTENSIONS, declared),
        CSV => declared != CSV && is_textual(declared),
        TEXT => declared != CSV && is_textual(declared),
        _ => false,
    }
}

/// Outcome of checking one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCheck {
    /// Type implied by the original filename.
    pub declared: &'static str,
    /// Type found in the content, if any.
    pub detected: Option<&'static str>,
}

impl TypeCheck {
    /// Returns `true` if content and declared type disagree.
    pub fn is_mismatch(&self) -> bool {
        !types_agree(self.declared, self.detected)
    }
}

/// Reads the head of `path` and compares it with `original_filename`.
pub async fn check_file(path: &Path, original_filename: &str) -> std::io::Result<TypeCheck> {
    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(HEAD_LEN);
    let read = file.take(HEAD_LEN as u64 + 1).read_to_end(&mut head).await?;
    let truncated = read > HEAD_LEN;
    head.truncate(HEAD_LEN);

    Ok(TypeCheck {
        declared: declared_type(original_filename),
        detected: detect(&head, truncated),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_type() {
        assert_eq!(declared_type("Report.PDF"), "application/pdf");
        assert_eq!(declared_type("a/b/data.csv"), "text/csv");
        assert_eq!(declared_type("noext"), UNKNOWN_TYPE);
        assert_eq!(declared_type("weird.qqzz"), UNKNOWN_TYPE);
        assert_eq!(declared_type("notes.txt"), TEXT);
        assert_eq!(declared_type("Q3.XLSX"), mime_for("xlsx"));
    }

    #[test]
    fn test_sniff_magic() {
        assert_eq!(sniff(b"%PDF-1.7\n..."), Some("application/pdf"));
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n\0\0"), Some("image/png"));
        assert_eq!(sniff(b"MZ\x90\0"), Some(mime_for("exe")));
        assert_eq!(sniff(b"PK\x03\x04....word/document.xml"), Some(mime_for("docx")));
        assert_eq!(sniff(b"PK\x03\x04....data.bin"), Some(ZIP));
        assert_eq!(sniff(b"hello"), None);
    }

    #[test]
    fn test_csv_heuristic() {
        assert!(looks_like_csv(b"a,b,c\n1,2,3\n\n4,5,6\n", false));
        assert!(!looks_like_csv(b"a,b,c\n1,2\n", false));
        assert!(!looks_like_csv(b"\n\n", false));
        // Partial trailing line is ignored when the head was cut short.
        assert!(looks_like_csv(b"a,b\r\n1,2\r\n3", true));
        assert!(!looks_like_csv(b"a,b\r\n1,2\r\n3", false));
    }

    #[test]
    fn test_text_heuristic() {
        assert!(looks_like_text(b"plain words\n\ttabbed\r\n"));
        assert!(looks_like_text(b""));
        assert!(!looks_like_text(b"bin\x00ary"));
        assert!(!looks_like_text("caf\u{e9}".as_bytes()));
    }

    #[test]
    fn test_detect_order() {
        assert_eq!(detect(b"%PDF-1.4", false), Some("application/pdf"));
        assert_eq!(detect(b"x,y\n1,2\n", false), Some(CSV));
        assert_eq!(detect(b"one, two\nthree\n", false), Some(TEXT));
        assert_eq!(detect(b"\x00\x01\x02", false), None);
    }

    #[test]
    fn test_types_agree() {
        assert!(types_agree("application/pdf", Some("application/pdf")));
        assert!(!types_agree("application/pdf", Some("application/x-elf")));
        assert!(!types_agree("application/pdf", None));
        assert!(types_agree(mime_for("doc"), Some(CFB)));
        assert!(types_agree(mime_for("xlsx"), Some(ZIP)));
        assert!(!types_agree(mime_for("xlsx"), Some(mime_for("docx"))));
        assert!(!types_agree(mime_for("pdf"), Some(CFB)));
        assert!(types_agree(TEXT, Some(CSV)));
        assert!(!types_agree(CSV, Some(TEXT)));
        assert!(types_agree("application/json", Some(TEXT)));
        assert!(types_agree(declared_type("feed.xml"), Some(TEXT)));
        assert!(types_agree("image/svg+xml", Some(TEXT)));
        assert!(types_agree(UNKNOWN_TYPE, None));
    }

    #[tokio::test]
    async fn test_check_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.tmp");
        std::fs::write(&path, b"MZ\x90\x00\x03\x00").unwrap();

        let check = check_file(&path, "invoice.pdf").await.unwrap();
        assert_eq!(check.declared, "application/pdf");
        assert_eq!(check.detected, Some(mime_for("exe")));
        assert!(check.is_mismatch());

        std::fs::write(&path, b"name,amount\nalice,3\n").unwrap();
        assert!(!check_file(&path, "ledger.csv").await.unwrap().is_mismatch());
    }
}
