//! FFI interface for C/C++ hosts
//!
//! Documents and field maps are passed in as strings; results come back as
//! JSON: `{"record": {...}, "absent": ["Field", ...]}`.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use serde::Serialize;

use crate::extractor::{ExtractorConfig, FieldExtractor, Record};
use crate::field_map::FieldMap;
use crate::schemas;
use crate::tree::{Document, DocumentKind};

/// Result struct returned to C/C++
/// Both pointers are owned by Rust and must be freed via free_extraction_result
#[repr(C)]
pub struct ExtractionResultFFI {
    /// JSON-serialized result (null-terminated)
    pub json_ptr: *mut c_char,
    /// Error message if extraction failed (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

#[derive(Serialize)]
struct ExtractionResponse<'a> {
    record: &'a Record,
    absent: Vec<String>,
}

/// Extract fields from an XML or HTML document.
///
/// # Arguments
/// * `doc_ptr` - Pointer to document text (UTF-8, not necessarily null-terminated)
/// * `doc_len` - Length of the document in bytes
/// * `kind` - `"xml"`, `"html"`, or null to detect from the content
/// * `field_map_json` - JSON field map (null-terminated)
/// * `options_json` - JSON extractor options such as `{"ambiguity": "reject"}`, or null
///
/// # Returns
/// ExtractionResultFFI with either json_ptr set (success) or error_ptr set (failure)
///
/// # Safety
/// - `doc_ptr` must point to valid memory of at least `doc_len` bytes
/// - `kind`, `field_map_json` and `options_json` must be null or valid null-terminated C strings
/// - Caller must free the result via `free_extraction_result`
#[no_mangle]
pub unsafe extern "C" fn extract_document(
    doc_ptr: *const c_char,
    doc_len: usize,
    kind: *const c_char,
    field_map_json: *const c_char,
    options_json: *const c_char,
) -> ExtractionResultFFI {
    let document = match read_document(doc_ptr, doc_len) {
        Ok(s) => s,
        Err(msg) => return make_error_result(msg),
    };

    let kind = match read_optional_str(kind, "kind") {
        Ok(None) => DocumentKind::detect(document),
        Ok(Some("xml")) => DocumentKind::Xml,
        Ok(Some("html")) => DocumentKind::Html,
        Ok(Some(other)) => return make_error_result(&format!("Unknown document kind: {}", other)),
        Err(msg) => return make_error_result(&msg),
    };

    let map = match read_optional_str(field_map_json, "field map") {
        Ok(Some(json)) => match FieldMap::from_json(json) {
            Ok(map) => map,
            Err(e) => return make_error_result(&format!("Invalid field map: {}", e)),
        },
        Ok(None) => return make_error_result("Field map JSON is null"),
        Err(msg) => return make_error_result(&msg),
    };

    let config = match read_optional_str(options_json, "options") {
        Ok(Some(json)) => match serde_json::from_str::<ExtractorConfig>(json) {
            Ok(config) => config,
            Err(e) => return make_error_result(&format!("Failed to parse options JSON: {}", e)),
        },
        Ok(None) => ExtractorConfig::default(),
        Err(msg) => return make_error_result(&msg),
    };

    make_result(perform_extraction(document, kind, &map, &config))
}

/// Extract the built-in CT-e field map from an XML document
///
/// # Safety
/// Same as extract_document
#[no_mangle]
pub unsafe extern "C" fn extract_cte_ffi(doc_ptr: *const c_char, doc_len: usize) -> ExtractionResultFFI {
    let document = match read_document(doc_ptr, doc_len) {
        Ok(s) => s,
        Err(msg) => return make_error_result(msg),
    };

    let map = match schemas::cte() {
        Ok(map) => map,
        Err(e) => return make_error_result(&format!("Invalid CT-e field map: {}", e)),
    };

    make_result(perform_extraction(
        document,
        DocumentKind::Xml,
        &map,
        &ExtractorConfig::default(),
    ))
}

/// Free an ExtractionResultFFI returned by this module
///
/// # Safety
/// - `result` must have been returned by `extract_document` or `extract_cte_ffi`
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn free_extraction_result(result: ExtractionResultFFI) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

fn perform_extraction(
    document: &str,
    kind: DocumentKind,
    map: &FieldMap,
    config: &ExtractorConfig,
) -> Result<String, String> {
    let doc = Document::parse(document, kind).map_err(|e| e.to_string())?;
    let record = FieldExtractor::from_config(config)
        .extract(&doc, map)
        .map_err(|e| e.to_string())?;

    let response = ExtractionResponse {
        absent: record.absent_fields(),
        record: &record,
    };
    serde_json::to_string(&response).map_err(|e| format!("Failed to serialize result: {}", e))
}

unsafe fn read_document<'a>(doc_ptr: *const c_char, doc_len: usize) -> Result<&'a str, &'static str> {
    if doc_ptr.is_null() || doc_len == 0 {
        return Ok("");
    }
    let slice = std::slice::from_raw_parts(doc_ptr as *const u8, doc_len);
    std::str::from_utf8(slice).map_err(|_| "Invalid UTF-8 in document")
}

unsafe fn read_optional_str<'a>(ptr: *const c_char, what: &str) -> Result<Option<&'a str>, String> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(Some)
        .map_err(|_| format!("Invalid UTF-8 in {}", what))
}

fn make_result(outcome: Result<String, String>) -> ExtractionResultFFI {
    match outcome {
        Ok(json) => match CString::new(json) {
            Ok(cstr) => ExtractionResultFFI {
                json_ptr: cstr.into_raw(),
                error_ptr: ptr::null_mut(),
            },
            Err(_) => make_error_result("Result JSON contains null bytes"),
        },
        Err(msg) => make_error_result(&msg),
    }
}

fn make_error_result(msg: &str) -> ExtractionResultFFI {
    let error_ptr = CString::new(msg.replace('\0', " "))
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut());
    ExtractionResultFFI {
        json_ptr: ptr::null_mut(),
        error_ptr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Copies the result strings out and frees the FFI allocation
    fn take(result: ExtractionResultFFI) -> (Option<String>, Option<String>) {
        let read = |p: *mut c_char| {
            (!p.is_null()).then(|| unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
        };
        let out = (read(result.json_ptr), read(result.error_ptr));
        unsafe { free_extraction_result(result) };
        out
    }

    fn call(doc: &str, kind: Option<&str>, map: &str, options: Option<&str>) -> (Option<String>, Option<String>) {
        let kind = kind.map(|k| CString::new(k).unwrap());
        let map = CString::new(map).unwrap();
        let options = options.map(|o| CString::new(o).unwrap());
        let result = unsafe {
            extract_document(
                doc.as_ptr() as *const c_char,
                doc.len(),
                kind.as_ref().map_or(ptr::null(), |k| k.as_ptr()),
                map.as_ptr(),
                options.as_ref().map_or(ptr::null(), |o| o.as_ptr()),
            )
        };
        take(result)
    }

    #[test]
    fn test_extract_document_json() {
        let (json, err) = call(
            "<emit><xNome>ACME</xNome></emit>",
            None,
            r#"{"Nome": "emit/xNome", "CNPJ": "emit/CNPJ"}"#,
            None,
        );
        assert_eq!(err, None);
        let value: serde_json::Value = serde_json::from_str(&json.unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"record": {"Nome": "ACME", "CNPJ": null}, "absent": ["CNPJ"]})
        );
    }

    #[test]
    fn test_extract_document_html() {
        let (json, err) = call(
            "<p class='x'>Olá</p>",
            Some("html"),
            r#"{"Texto": "//p", "Classe": "//p/@class"}"#,
            None,
        );
        assert_eq!(err, None);
        let value: serde_json::Value = serde_json::from_str(&json.unwrap()).unwrap();
        assert_eq!(value["record"], serde_json::json!({"Texto": "Olá", "Classe": "x"}));
    }

    #[test]
    fn test_errors_are_reported() {
        let (json, err) = call("", Some("xml"), r#"{"A": "a"}"#, None);
        assert_eq!(json, None);
        assert_eq!(err.unwrap(), "document has no root element");

        let (_, err) = call("<a/>", Some("pdf"), r#"{"A": "a"}"#, None);
        assert!(err.unwrap().contains("Unknown document kind"));

        let (_, err) = call("<a/>", None, r#"{"A": "a//"}"#, None);
        assert!(err.unwrap().starts_with("Invalid field map"));

        let (_, err) = call("<a><b/><b/></a>", None, r#"{"B": "a/b"}"#, Some(r#"{"ambiguity": "reject"}"#));
        assert_eq!(err.unwrap(), "field 'B' matched 2 nodes");
    }

    #[test]
    fn test_extract_cte_ffi() {
        let doc = schemas::SAMPLE_CTE;
        let (json, err) = take(unsafe { extract_cte_ffi(doc.as_ptr() as *const c_char, doc.len()) });
        assert_eq!(err, None);

        let value: serde_json::Value = serde_json::from_str(&json.unwrap()).unwrap();
        assert_eq!(
            value["record"]["Chave"],
            "35240112345678000190570010000012341000012345"
        );
        assert_eq!(value["record"]["Emitente"]["Nome"], "ACME TRANSPORTES LTDA");
        assert_eq!(value["record"]["Emitente"]["Fantasia"], serde_json::Value::Null);
        assert_eq!(value["record"]["Quantidades"].as_array().unwrap().len(), 3);
        assert_eq!(
            value["absent"],
            serde_json::json!(["Emitente.Fantasia", "Remetente.IE", "Destinatario.IE"])
        );
    }

    #[test]
    fn test_extract_cte_ffi_errors() {
        let (json, err) = take(unsafe { extract_cte_ffi(ptr::null(), 0) });
        assert_eq!(json, None);
        assert_eq!(err.unwrap(), "document has no root element");

        let broken = "<CTe><infCte></CTe>";
        let (_, err) = take(unsafe { extract_cte_ffi(broken.as_ptr() as *const c_char, broken.len()) });
        assert!(err.unwrap().starts_with("XML parse error"));

        let bad_utf8 = [0x3c_u8, 0xff, 0xfe];
        let (_, err) = take(unsafe { extract_cte_ffi(bad_utf8.as_ptr() as *const c_char, bad_utf8.len()) });
        assert_eq!(err.unwrap(), "Invalid UTF-8 in document");
    }
}
