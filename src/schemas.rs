//! Built-in field maps
//!
//! - [`cte`]: Brazilian electronic transport document (CT-e), either the bare
//!   `CTe` element or the authorised `cteProc` envelope
//! - [`html_table`]: rows of a fixed-layout HTML table

use crate::error::FieldMapError;
use crate::field_map::FieldMap;

/// CT-e field map in its JSON form
pub const CTE_FIELD_MAP: &str = r#"{
  "Chave": { "path": "//infCte/@Id", "transform": "digits" },
  "Identificacao": {
    "anchor": "//infCte/ide",
    "fields": {
      "Numero": "nCT",
      "Serie": "serie",
      "Modelo": "mod",
      "CFOP": "CFOP",
      "NaturezaOperacao": "natOp",
      "Emissao": "dhEmi",
      "TipoCTe": "tpCTe",
      "Modal": "modal",
      "TipoServico": "tpServ",
      "MunicipioInicio": "xMunIni",
      "UFInicio": "UFIni",
      "MunicipioFim": "xMunFim",
      "UFFim": "UFFim"
    }
  },
  "Emitente": {
    "anchor": "//infCte/emit",
    "fields": {
      "CNPJ": "CNPJ|CPF",
      "IE": "IE",
      "Nome": "xNome",
      "Fantasia": "xFant",
      "Logradouro": "enderEmit/xLgr",
      "Numero": "enderEmit/nro",
      "Bairro": "enderEmit/xBairro",
      "Municipio": "enderEmit/xMun",
      "UF": "enderEmit/UF",
      "CEP": "enderEmit/CEP"
    }
  },
  "Remetente": {
    "anchor": "//infCte/rem",
    "fields": {
      "Documento": "CNPJ|CPF",
      "IE": "IE",
      "Nome": "xNome",
      "Municipio": "enderReme/xMun",
      "UF": "enderReme/UF"
    }
  },
  "Destinatario": {
    "anchor": "//infCte/dest",
    "fields": {
      "Documento": "CNPJ|CPF",
      "IE": "IE",
      "Nome": "xNome",
      "Municipio": "enderDest/xMun",
      "UF": "enderDest/UF"
    }
  },
  "Valores": {
    "anchor": "//infCte/vPrest",
    "fields": {
      "Total": { "path": "vTPrest", "transform": "number" },
      "Receber": { "path": "vRec", "transform": "number" }
    }
  },
  "Componentes": {
    "each": "//infCte/vPrest/Comp",
    "fields": {
      "Nome": "xNome",
      "Valor": { "path": "vComp", "transform": "number" }
    }
  },
  "ICMS": {
    "anchor": "//infCte/imp/ICMS/*",
    "fields": {
      "CST": "CST",
      "BaseCalculo": { "path": "vBC", "transform": "number" },
      "Aliquota": { "path": "pICMS", "transform": "number" },
      "Valor": { "path": "vICMS", "transform": "number" }
    }
  },
  "Carga": {
    "anchor": "//infCte/infCTeNorm/infCarga",
    "fields": {
      "Valor": { "path": "vCarga", "transform": "number" },
      "ProdutoPredominante": "proPred"
    }
  },
  "Quantidades": {
    "each": "//infCte/infCTeNorm/infCarga/infQ",
    "fields": {
      "Unidade": "cUnid",
      "Medida": "tpMed",
      "Quantidade": { "path": "qCarga", "transform": "number" }
    }
  },
  "NotasFiscais": {
    "each": "//infCte/infCTeNorm/infDoc/infNFe",
    "fields": {
      "Chave": "chave"
    }
  },
  "Protocolo": {
    "anchor": "//protCTe/infProt",
    "fields": {
      "Chave": "chCTe",
      "Numero": "nProt",
      "Recebimento": "dhRecbto",
      "Status": "cStat",
      "Motivo": "xMotivo"
    }
  }
}"#;

pub fn cte() -> Result<FieldMap, FieldMapError> {
    FieldMap::from_json(CTE_FIELD_MAP)
}

/// `{"rows": [...]}`: one record per `tr` below `table_path`, column `i`
/// read from the row's `i`-th `td`. Header rows made of `th` cells come out
/// with every column absent.
pub fn html_table(table_path: &str, columns: &[&str]) -> Result<FieldMap, FieldMapError> {
    let mut row = FieldMap::new();
    for (i, column) in columns.iter().enumerate() {
        row = row.with_value(column, &format!("td[{}]", i + 1))?;
    }

    let anchor = format!("{}//tr", table_path.trim_end_matches('/'));
    FieldMap::new().with_each("rows", &anchor, row)
}

/// Authorised CT-e used by tests across the crate
#[cfg(test)]
pub(crate) const SAMPLE_CTE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cteProc xmlns="http://www.portalfiscal.inf.br/cte" versao="4.00">
  <CTe>
    <infCte Id="CTe35240112345678000190570010000012341000012345" versao="4.00">
      <ide>
        <cUF>35</cUF><CFOP>6353</CFOP><natOp>PRESTACAO DE SERVICO DE TRANSPORTE</natOp>
        <mod>57</mod><serie>1</serie><nCT>1234</nCT><dhEmi>2024-01-15T10:30:00-03:00</dhEmi>
        <tpCTe>0</tpCTe><modal>01</modal><tpServ>0</tpServ>
        <xMunIni>SAO PAULO</xMunIni><UFIni>SP</UFIni><xMunFim>CURITIBA</xMunFim><UFFim>PR</UFFim>
      </ide>
      <emit>
        <CNPJ>12345678000190</CNPJ><IE>123456789</IE><xNome>ACME TRANSPORTES LTDA</xNome>
        <enderEmit><xLgr>RUA A</xLgr><nro>100</nro><xBairro>CENTRO</xBairro><xMun>SAO PAULO</xMun><CEP>01000000</CEP><UF>SP</UF></enderEmit>
      </emit>
      <rem><CPF>12345678901</CPF><xNome>JOAO DA SILVA</xNome><enderReme><xMun>SAO PAULO</xMun><UF>SP</UF></enderReme></rem>
      <dest><CNPJ>98765432000110</CNPJ><xNome>LOJA CURITIBA</xNome><enderDest><xMun>CURITIBA</xMun><UF>PR</UF></enderDest></dest>
      <vPrest>
        <vTPrest>1500.00</vTPrest><vRec>1500.00</vRec>
        <Comp><xNome>FRETE PESO</xNome><vComp>1200.00</vComp></Comp>
        <Comp><xNome>PEDAGIO</xNome><vComp>300.00</vComp></Comp>
      </vPrest>
      <imp><ICMS><ICMS00><CST>00</CST><vBC>1500.00</vBC><pICMS>12.00</pICMS><vICMS>180.00</vICMS></ICMS00></ICMS></imp>
      <infCTeNorm>
        <infCarga>
          <vCarga>25000.00</vCarga><proPred>ELETRONICOS</proPred>
          <infQ><cUnid>01</cUnid><tpMed>PESO BRUTO</tpMed><qCarga>350.0000</qCarga></infQ>
          <infQ><cUnid>03</cUnid><tpMed>VOLUMES</tpMed><qCarga>12.0000</qCarga></infQ>
          <infQ><cUnid>00</cUnid><tpMed>M3</tpMed><qCarga>1.5000</qCarga></infQ>
        </infCarga>
        <infDoc><infNFe><chave>35240198765432000110550010000056781000056789</chave></infNFe></infDoc>
      </infCTeNorm>
    </infCte>
  </CTe>
  <protCTe versao="4.00">
    <infProt><chCTe>35240112345678000190570010000012341000012345</chCTe><dhRecbto>2024-01-15T10:31:00-03:00</dhRecbto><nProt>135240000000001</nProt><cStat>100</cStat><xMotivo>Autorizado o uso do CT-e</xMotivo></infProt>
  </protCTe>
</cteProc>"#;
