use doc_extractor::{
    extract, AmbiguityPolicy, Document, ExtractError, FieldExtractor, FieldMap, FieldValue, Record,
    Table,
};

fn scenario_map() -> FieldMap {
    FieldMap::from_json(r#"{"Nome": "emit/xNome", "CNPJ": "emit/CNPJ"}"#).unwrap()
}

fn nested_map() -> FieldMap {
    FieldMap::from_json(
        r#"{
            "Numero": "//ide/nCT",
            "Emitente": { "anchor": "//emit", "fields": { "Nome": "xNome", "CNPJ": "CNPJ" } },
            "Cargas": {
                "each": "//infCarga/infQ",
                "fields": { "Medida": "tpMed", "Qtd": { "path": "qCarga", "transform": "number" } }
            }
        }"#,
    )
    .unwrap()
}

#[test]
fn scenario_single_field() {
    let doc = Document::parse_xml("<emit><xNome>ACME</xNome></emit>").unwrap();
    let map = FieldMap::from_json(r#"{"Nome": "emit/xNome"}"#).unwrap();

    let record = extract(&doc, &map).unwrap();
    assert_eq!(serde_json::to_value(&record).unwrap(), serde_json::json!({"Nome": "ACME"}));
}

#[test]
fn scenario_absent_field() {
    let doc = Document::parse_xml("<emit><xNome>ACME</xNome></emit>").unwrap();
    let record = extract(&doc, &scenario_map()).unwrap();

    assert_eq!(record.text("Nome"), Some("ACME"));
    assert_eq!(record.get("CNPJ"), Some(&FieldValue::Absent));
    assert_eq!(
        serde_json::to_value(&record).unwrap(),
        serde_json::json!({"Nome": "ACME", "CNPJ": null})
    );
}

#[test]
fn scenario_three_siblings() {
    let doc = Document::parse_xml(
        "<infCarga><infQ><tpMed>A</tpMed></infQ><infQ><tpMed>B</tpMed></infQ><infQ><tpMed>C</tpMed></infQ></infCarga>",
    )
    .unwrap();
    let map = FieldMap::from_json(r#"{"Q": {"each": "infCarga/infQ", "fields": {"M": "tpMed"}}}"#).unwrap();

    let record = extract(&doc, &map).unwrap();
    assert_eq!(
        serde_json::to_value(&record).unwrap(),
        serde_json::json!({"Q": [{"M": "A"}, {"M": "B"}, {"M": "C"}]})
    );
}

#[test]
fn scenario_empty_tree() {
    let empty = Document::parse_xml("").unwrap();
    assert_eq!(extract(&empty, &scenario_map()), Err(ExtractError::MalformedDocument));
}

#[test]
fn shape_matches_field_map_for_varied_documents() {
    let documents = [
        "<r/>",
        "<emit><xNome>ACME</xNome></emit>",
        "<cte><ide><nCT>1</nCT></ide><emit><xNome>X</xNome><CNPJ>1</CNPJ></emit></cte>",
        "<cte><infCarga><infQ><tpMed>PESO</tpMed><qCarga>1,5</qCarga></infQ><infQ/></infCarga></cte>",
        "<a><emit/><emit><xNome>dup</xNome></emit><ide><nCT>1</nCT><nCT>2</nCT></ide></a>",
    ];

    for map in [scenario_map(), nested_map()] {
        for text in documents {
            let doc = Document::parse_xml(text).unwrap();
            let record = extract(&doc, &map).unwrap();
            assert!(record.conforms_to(&map), "shape mismatch for {}", text);
            assert_eq!(record.len(), map.len());
        }
    }
}

#[test]
fn extraction_is_idempotent() {
    let doc = Document::parse_xml(
        "<cte><ide><nCT>7</nCT></ide><infCarga><infQ><qCarga>2</qCarga></infQ></infCarga></cte>",
    )
    .unwrap();
    let map = nested_map();
    assert_eq!(extract(&doc, &map).unwrap(), extract(&doc, &map).unwrap());
}

#[test]
fn partial_document_yields_full_record() {
    let doc = Document::parse_xml(
        "<r><a>1</a><b>2</b><c>3</c><d>4</d><e>5</e><f>6</f><g>7</g></r>",
    )
    .unwrap();
    let map = FieldMap::from_json(
        r#"{"A": "r/a", "B": "r/b", "C": "r/c", "D": "r/d", "E": "r/e",
            "F": "r/f", "G": "r/g", "H": "r/h", "I": "r/i", "J": "r/j"}"#,
    )
    .unwrap();

    let record = extract(&doc, &map).unwrap();
    assert_eq!(record.len(), 10);
    assert_eq!(record.iter().filter(|(_, v)| v.is_absent()).count(), 3);
    assert_eq!(record.absent_fields(), vec!["H", "I", "J"]);
}

#[test]
fn missing_anchor_yields_absent_group() {
    let doc = Document::parse_xml("<cte><ide><nCT>7</nCT></ide></cte>").unwrap();
    let record = extract(&doc, &nested_map()).unwrap();

    assert_eq!(
        serde_json::to_value(&record).unwrap(),
        serde_json::json!({
            "Numero": "7",
            "Emitente": {"Nome": null, "CNPJ": null},
            "Cargas": []
        })
    );
}

#[test]
fn ambiguous_field_policy() {
    let doc = Document::parse_xml("<a><ide><nCT>1</nCT><nCT>2</nCT></ide><emit/></a>").unwrap();
    let map = nested_map();

    let lenient = FieldExtractor::default().extract(&doc, &map).unwrap();
    assert_eq!(lenient.text("Numero"), Some("1"));

    let strict = FieldExtractor::new(AmbiguityPolicy::Reject).extract(&doc, &map);
    assert!(matches!(
        strict,
        Err(ExtractError::AmbiguousField { ref field, matches: 2 }) if field == "Numero"
    ));
}

#[test]
fn scraped_html_table_to_csv() {
    let html = r#"<!DOCTYPE html>
    <html><body>
      <table class="standings">
        <tr><td>Azul</td><td> 10 </td></tr>
        <tr><td>Verde</td><td>7</td></tr>
      </table>
    </body></html>"#;
    let doc = Document::parse_html(html);
    let map = doc_extractor::schemas::html_table("//table", &["Time", "Pontos"]).unwrap();
    let record = extract(&doc, &map).unwrap();

    let table = Table::explode(&record, "rows").unwrap();
    let csv = table.to_csv_string(&Default::default()).unwrap();
    assert_eq!(csv, "rows.Time,rows.Pontos\nAzul,10\nVerde,7\n");
}

#[test]
fn shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Document>();
    assert_send_sync::<FieldMap>();
    assert_send_sync::<FieldExtractor>();
    assert_send_sync::<Record>();

    let doc = std::sync::Arc::new(Document::parse_xml("<emit><xNome>ACME</xNome></emit>").unwrap());
    let map = std::sync::Arc::new(scenario_map());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let doc = doc.clone();
            let map = map.clone();
            std::thread::spawn(move || extract(&doc, &map).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().text("Nome"), Some("ACME"));
    }
}
