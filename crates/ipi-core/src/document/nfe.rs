//! NF-e item extraction using quick-xml.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use tracing::{debug, trace};

use super::{DocumentReader, Result};
use crate::error::DocumentError;
use crate::models::config::{DocumentConfig, NFE_NAMESPACE};
use crate::models::item::ItemRecord;

const DET: &[u8] = b"det";
const PROD: &[u8] = b"prod";

/// Reads `det/prod` records from NF-e documents.
///
/// Every `det` element in the configured namespace becomes one
/// [`ItemRecord`]; the direct children of its `prod` element become the
/// record's fields, keyed by local name. Anything outside the namespace is
/// ignored.
#[derive(Debug, Clone)]
pub struct NfeReader {
    namespace: String,
}

/// Open `det` element and its `prod` child, if entered.
struct OpenItem {
    record: ItemRecord,
    depth: usize,
    prod_depth: Option<usize>,
}

/// Open field element inside `prod`.
struct OpenField {
    name: String,
    text: String,
    depth: usize,
}

impl NfeReader {
    /// Reader for the standard NF-e namespace.
    pub fn new() -> Self {
        Self {
            namespace: NFE_NAMESPACE.to_string(),
        }
    }

    /// Build a reader from the document configuration.
    pub fn from_config(config: &DocumentConfig) -> Self {
        Self::new().with_namespace(config.namespace.clone())
    }

    /// Set the namespace of the `det` and `prod` elements.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Read items from an in-memory document.
    pub fn read_str(&self, xml: &str) -> Result<Vec<ItemRecord>> {
        self.read(NsReader::from_str(xml))
    }

    fn in_namespace(&self, ns: &ResolveResult) -> bool {
        matches!(ns, ResolveResult::Bound(Namespace(uri)) if *uri == self.namespace.as_bytes())
    }

    fn read<R: BufRead>(&self, mut reader: NsReader<R>) -> Result<Vec<ItemRecord>> {
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut items = Vec::new();
        let mut depth = 0usize;
        let mut seen_root = false;
        let mut item: Option<OpenItem> = None;
        let mut field: Option<OpenField> = None;

        loop {
            match reader.read_resolved_event_into(&mut buf)? {
                (ns, Event::Start(e)) => {
                    if depth == 0 && seen_root {
                        return Err(DocumentError::OutsideRoot);
                    }
                    depth += 1;
                    seen_root = true;
                    let local = e.local_name();
                    let in_ns = self.in_namespace(&ns);

                    if let Some(open) = item.as_mut() {
                        match open.prod_depth {
                            None if in_ns && local.as_ref() == PROD && depth == open.depth + 1 => {
                                open.prod_depth = Some(depth);
                            }
                            Some(prod_depth) if depth == prod_depth + 1 => {
                                field = Some(OpenField {
                                    name: element_name(&e),
                                    text: String::new(),
                                    depth,
                                });
                            }
                            _ => {}
                        }
                    } else if in_ns && local.as_ref() == DET {
                        item = Some(OpenItem {
                            record: ItemRecord::new(items.len() + 1),
                            depth,
                            prod_depth: None,
                        });
                    }
                }
                (ns, Event::Empty(e)) => {
                    if depth == 0 && seen_root {
                        return Err(DocumentError::OutsideRoot);
                    }
                    seen_root = true;
                    let in_ns = self.in_namespace(&ns);

                    match item.as_mut() {
                        None if in_ns && e.local_name().as_ref() == DET => {
                            items.push(ItemRecord::new(items.len() + 1));
                        }
                        Some(open) if open.prod_depth == Some(depth) => {
                            open.record.fields.insert(element_name(&e), String::new());
                        }
                        _ => {}
                    }
                }
                (_, Event::Text(t)) => {
                    if depth == 0 && !t.iter().all(u8::is_ascii_whitespace) {
                        return Err(DocumentError::OutsideRoot);
                    }
                    if let Some(open) = field.as_mut().filter(|f| f.depth == depth) {
                        open.text.push_str(&t.unescape()?);
                    }
                }
                (_, Event::CData(c)) => {
                    if let Some(open) = field.as_mut().filter(|f| f.depth == depth) {
                        open.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                (_, Event::End(_)) => {
                    if field.as_ref().is_some_and(|f| f.depth == depth) {
                        if let (Some(done), Some(open)) = (field.take(), item.as_mut()) {
                            trace!("item {} field {}={}", open.record.ordinal, done.name, done.text);
                            open.record.fields.insert(done.name, done.text.trim().to_string());
                        }
                    }

                    if let Some(open) = item.as_mut() {
                        if open.prod_depth == Some(depth) {
                            open.prod_depth = None;
                        }
                    }
                    if item.as_ref().is_some_and(|open| open.depth == depth) {
                        if let Some(done) = item.take() {
                            items.push(done.record);
                        }
                    }

                    depth = depth.saturating_sub(1);
                }
                (_, Event::Eof) => break,
                _ => {}
            }
            buf.clear();
        }

        if depth > 0 {
            return Err(DocumentError::Truncated(depth));
        }
        if !seen_root {
            return Err(DocumentError::NoRoot);
        }

        debug!("Read {} item(s)", items.len());
        Ok(items)
    }
}

impl Default for NfeReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentReader for NfeReader {
    fn read_items(&self, path: &Path) -> Result<Vec<ItemRecord>> {
        let file = File::open(path).map_err(|source| DocumentError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.read(NsReader::from_reader(BufReader::new(file)))
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::{NCM_FIELD, VPROD_FIELD};
    use pretty_assertions::assert_eq;

    const NFE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe35240112345678000199550010000000011000000010" versao="4.00">
      <det nItem="1">
        <prod>
          <cProd>001</cProd>
          <xProd>Notebook &amp; carregador</xProd>
          <NCM>84713019</NCM>
          <CFOP>5102</CFOP>
          <vProd>1000.00</vProd>
        </prod>
        <imposto><vTotTrib>0.00</vTotTrib></imposto>
      </det>
      <det nItem="2">
        <prod>
          <cProd>002</cProd>
          <NCM>01012100</NCM>
          <vProd>50.00</vProd>
        </prod>
      </det>
      <total><ICMSTot><vProd>1050.00</vProd></ICMSTot></total>
    </infNFe>
  </NFe>
</nfeProc>"#;

    #[test]
    fn test_reads_det_prod_fields() {
        let items = NfeReader::new().read_str(NFE).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].ordinal, 1);
        assert_eq!(items[0].field(NCM_FIELD), Some("84713019"));
        assert_eq!(items[0].field(VPROD_FIELD), Some("1000.00"));
        assert_eq!(items[0].field("xProd"), Some("Notebook & carregador"));
        assert_eq!(items[0].field("vTotTrib"), None);
        assert_eq!(items[1].ordinal, 2);
        assert_eq!(items[1].field(NCM_FIELD), Some("01012100"));
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let xml = r#"<NFe xmlns="http://www.portalfiscal.inf.br/nfe"><det><prod>
            <vProd>10.00</vProd><NCM>22030000</NCM>
        </prod></det></NFe>"#;
        let items = NfeReader::new().read_str(xml).unwrap();

        assert_eq!(items[0].field(NCM_FIELD), Some("22030000"));
        assert_eq!(items[0].field(VPROD_FIELD), Some("10.00"));
    }

    #[test]
    fn test_prefixed_namespace() {
        let xml = r#"<n:NFe xmlns:n="http://www.portalfiscal.inf.br/nfe">
            <n:det><n:prod><n:NCM>22030000</n:NCM><n:vProd>5</n:vProd></n:prod></n:det>
        </n:NFe>"#;
        let items = NfeReader::new().read_str(xml).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].field(NCM_FIELD), Some("22030000"));
    }

    #[test]
    fn test_ignores_other_namespaces() {
        let xml = r#"<NFe><det><prod><NCM>22030000</NCM><vProd>5</vProd></prod></det></NFe>"#;
        let items = NfeReader::new().read_str(xml).unwrap();
        assert!(items.is_empty());

        let items = NfeReader::new()
            .with_namespace("urn:test")
            .read_str(r#"<a xmlns="urn:test"><det><prod><NCM>1</NCM></prod></det></a>"#)
            .unwrap();
        assert_eq!(items[0].field(NCM_FIELD), Some("1"));
    }

    #[test]
    fn test_missing_fields_and_empty_elements() {
        let xml = r#"<NFe xmlns="http://www.portalfiscal.inf.br/nfe">
            <det><prod><cProd>1</cProd><NCM/></prod></det>
            <det/>
        </NFe>"#;
        let items = NfeReader::new().read_str(xml).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].field(NCM_FIELD), Some(""));
        assert_eq!(items[0].field(VPROD_FIELD), None);
        assert_eq!(items[1].ordinal, 2);
        assert!(items[1].fields.is_empty());
    }

    #[test]
    fn test_nested_children_are_not_fields() {
        let xml = r#"<NFe xmlns="http://www.portalfiscal.inf.br/nfe"><det><prod>
            <NCM>22030000</NCM>
            <rastro><nLote>L1</nLote></rastro>
        </prod></det></NFe>"#;
        let items = NfeReader::new().read_str(xml).unwrap();

        assert_eq!(items[0].field("nLote"), None);
        assert_eq!(items[0].field("rastro"), Some(""));
    }

    #[test]
    fn test_document_without_items() {
        let xml = r#"<NFe xmlns="http://www.portalfiscal.inf.br/nfe"><infNFe/></NFe>"#;
        assert!(NfeReader::new().read_str(xml).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_documents() {
        let reader = NfeReader::new();

        assert!(matches!(
            reader.read_str("<NFe><det></NFe>"),
            Err(DocumentError::Xml(_))
        ));
        assert!(matches!(
            reader.read_str(r#"<NFe xmlns="http://www.portalfiscal.inf.br/nfe"><det><prod>"#),
            Err(DocumentError::Truncated(_) | DocumentError::Xml(_))
        ));
        assert!(matches!(reader.read_str("not an invoice"), Err(DocumentError::OutsideRoot)));
        assert!(matches!(reader.read_str(""), Err(DocumentError::NoRoot)));
    }

    #[test]
    fn test_content_after_root_is_malformed() {
        let reader = NfeReader::new();
        let nfe = r#"<NFe xmlns="http://www.portalfiscal.inf.br/nfe"><det><prod><NCM>1</NCM></prod></det></NFe>"#;

        let two_roots = format!("{}{}", nfe, nfe);
        assert!(matches!(reader.read_str(&two_roots), Err(DocumentError::OutsideRoot)));

        let empty_sibling = format!("{}<NFe/>", nfe);
        assert!(matches!(reader.read_str(&empty_sibling), Err(DocumentError::OutsideRoot)));

        let trailing_text = format!("{}garbage", nfe);
        assert!(matches!(reader.read_str(&trailing_text), Err(DocumentError::OutsideRoot)));

        let trailing_space = format!("{}\n  \n<!-- signed -->\n", nfe);
        assert_eq!(reader.read_str(&trailing_space).unwrap().len(), 1);
    }

    #[test]
    fn test_read_items_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nota.xml");
        std::fs::write(&path, NFE).unwrap();

        let items = NfeReader::new().read_items(&path).unwrap();
        assert_eq!(items.len(), 2);

        let missing = NfeReader::new().read_items(&dir.path().join("missing.xml"));
        assert!(matches!(missing, Err(DocumentError::Open { .. })));
    }
}
