//! Minimal `multipart/form-data` parsing for single-file uploads.

/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`, returning the pieces
/// between occurrences (excluding the needle itself).
pub fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';').map(str::trim);
    let mime = params.next()?;
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .find_map(|p| p.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_owned())
        .filter(|b| !b.is_empty())
}

/// One body part with the parameters of its `Content-Disposition` header.
#[derive(Debug, PartialEq, Eq)]
pub struct Part<'a> {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub data: &'a [u8],
}

/// Splits a multipart body into its parts; the preamble, the closing
/// delimiter and anything without a header block are dropped.
pub fn parse_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<Part<'a>> {
    let delimiter = format!("--{}", boundary);
    let sep = b"\r\n\r\n";
    let mut parts = Vec::new();

    for raw in split_on(body, delimiter.as_bytes()) {
        let Some(sep_pos) = find_subsequence(raw, sep) else {
            continue;
        };
        let headers = String::from_utf8_lossy(&raw[..sep_pos]);
        let Some(disposition) = headers
            .split("\r\n")
            .find_map(|line| header_value(line, "content-disposition"))
        else {
            continue;
        };
        let data = &raw[sep_pos + sep.len()..];
        parts.push(Part {
            name: disposition_param(disposition, "name"),
            filename: disposition_param(disposition, "filename"),
            data: data.strip_suffix(b"\r\n").unwrap_or(data),
        });
    }
    parts
}

/// The bytes of the file part named `field`, or of the first file part when
/// no part has that name.
pub fn extract_file(body: &[u8], boundary: &str, field: &str) -> Option<Vec<u8>> {
    let files: Vec<Part> = parse_parts(body, boundary)
        .into_iter()
        .filter(|p| p.filename.is_some())
        .collect();
    files
        .iter()
        .find(|p| p.name.as_deref() == Some(field))
        .or_else(|| files.first())
        .map(|p| p.data.to_vec())
}

fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = line.split_once(':')?;
    key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
}

/// Reads `key="value"` (or an unquoted value) from a Content-Disposition
/// header such as `form-data; name="file"; filename="leaf.jpg"`.
fn disposition_param(disposition: &str, key: &str) -> Option<String> {
    disposition.split(';').map(str::trim).find_map(|param| {
        let (k, v) = param.split_once('=')?;
        k.trim().eq_ignore_ascii_case(key).then(|| v.trim().trim_matches('"').to_owned())
    })
}
