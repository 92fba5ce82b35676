use std::collections::HashMap;
use std::sync::Arc;

use crate::bits::BitReader;
use crate::checksum::{Checksummer, Crc16Ccitt, Crc32, Crc8};
use crate::describe::TemplateDescription;
use crate::result::{Error, Result};
use crate::schema::Schema;
use crate::template::Template;

/// Compiles schemas and indexes the results two ways: by type name for
/// sub-template resolution, and by header start sequence for top-level
/// dispatch. Longer start sequences are tried first, so the template
/// picked for a buffer always has the longest matching key.
#[derive(Debug, Default)]
pub struct TemplateLoader {
    templates: HashMap<String, Arc<Template>>,
    index: Vec<IndexEntry>,
    checksummers: HashMap<String, Arc<dyn Checksummer>>,
}

#[derive(Debug)]
struct IndexEntry {
    key: Vec<u8>,
    lps: Vec<usize>,
    template: Arc<Template>,
}

impl TemplateLoader {
    pub fn new() -> Self {
        let mut this = Self::default();
        this.register_checksummer("crc8", Arc::new(Crc8));
        this.register_checksummer("crc16-ccitt", Arc::new(Crc16Ccitt));
        this.register_checksummer("crc32", Arc::new(Crc32));
        this
    }

    pub fn register_checksummer(&mut self, id: impl Into<String>, algorithm: Arc<dyn Checksummer>) {
        self.checksummers.insert(id.into(), algorithm);
    }

    /// Compiles and registers a schema. Templates that carry a header and
    /// at least one bounded field additionally enter the dispatch index.
    pub fn add(&mut self, schema: &Schema) -> Result<Arc<Template>> {
        let template = Arc::new(Template::compile(schema, &self.checksummers)?);

        if let Some(header) = template.header().as_ref().filter(|_| template.can_be_coded()) {
            let starts = &schema.header.as_ref().expect("codable implies header").starts;
            let mut fresh = Vec::with_capacity(header.starts.len());
            for (key, start) in header.starts.iter().zip(starts) {
                if self
                    .index
                    .iter()
                    .chain(fresh.iter())
                    .any(|entry: &IndexEntry| entry.key == *key)
                {
                    return Err(Error::DuplicateHeader(start.clone()));
                }
                fresh.push(IndexEntry {
                    key: key.clone(),
                    lps: lps_table(key),
                    template: template.clone(),
                });
            }
            self.index.extend(fresh);
            // stable, so equal-length keys keep insertion order
            self.index.sort_by_key(|entry| std::cmp::Reverse(entry.key.len()));
        }

        self.templates.insert(schema.name().to_owned(), template.clone());
        Ok(template)
    }

    pub fn get(&self, type_name: &str) -> Result<&Arc<Template>> {
        self.templates
            .get(type_name)
            .ok_or_else(|| Error::UnknownTemplate(type_name.to_owned()))
    }

    /// Picks the template whose header start matches the bytes at the
    /// reader's current position.
    pub fn pick(&self, reader: &BitReader) -> Result<&Arc<Template>> {
        for entry in &self.index {
            if reader.peek_bytes(entry.key.len()) == Some(entry.key.as_slice()) {
                return Ok(&entry.template);
            }
        }
        Err(Error::TemplateNotFound(reader.position_bytes()))
    }

    /// Descriptions of every registered template, ordered by type name.
    pub fn describe(&self) -> Vec<TemplateDescription> {
        let mut names: Vec<_> = self.templates.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| TemplateDescription::of(&self.templates[name]))
            .collect()
    }

    /// The byte index of the closest header start strictly after the
    /// reader's position, or `None` when no key occurs again.
    pub fn next_message_index(&self, reader: &BitReader) -> Option<usize> {
        let buf = reader.buffer();
        let from = reader.position_bytes() + 1;
        self.index
            .iter()
            .filter_map(|entry| kmp_find(&buf[from.min(buf.len())..], &entry.key, &entry.lps))
            .min()
            .map(|offset| from + offset)
    }
}

fn lps_table(key: &[u8]) -> Vec<usize> {
    let mut lps = vec![0; key.len()];
    let mut len = 0;
    let mut i = 1;
    while i < key.len() {
        if key[i] == key[len] {
            len += 1;
            lps[i] = len;
            i += 1;
        } else if len > 0 {
            len = lps[len - 1];
        } else {
            lps[i] = 0;
            i += 1;
        }
    }
    lps
}

fn kmp_find(haystack: &[u8], needle: &[u8], lps: &[usize]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let mut j = 0;
    for (i, byte) in haystack.iter().enumerate() {
        while j > 0 && *byte != needle[j] {
            j = lps[j - 1];
        }
        if *byte == needle[j] {
            j += 1;
            if j == needle.len() {
                return Some(i + 1 - j);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Annotation, FieldDecl, Header};
    use assert_matches::assert_matches;

    fn coded_schema(name: &str, starts: &[&str]) -> Schema {
        Schema::new(name)
            .header(Header::new(starts.to_vec()))
            .field(FieldDecl::new("value").with(Annotation::Byte))
    }

    #[test]
    fn duplicate_start_sequences_are_rejected() {
        let mut loader = TemplateLoader::new();
        loader.add(&coded_schema("a", &["+AA"])).unwrap();
        assert_matches!(
            loader.add(&coded_schema("b", &["+AA"])),
            Err(Error::DuplicateHeader(key)) if key == "+AA"
        );
    }

    #[test]
    fn longest_key_wins() {
        let mut loader = TemplateLoader::new();
        loader.add(&coded_schema("short", &["+A"])).unwrap();
        loader.add(&coded_schema("long", &["+AB"])).unwrap();

        let buf = b"+ABx";
        let reader = BitReader::new(buf);
        assert_eq!(loader.pick(&reader).unwrap().name(), "long");

        let buf = b"+Ax";
        let reader = BitReader::new(buf);
        assert_eq!(loader.pick(&reader).unwrap().name(), "short");
    }

    #[test]
    fn no_match_is_an_error() {
        let mut loader = TemplateLoader::new();
        loader.add(&coded_schema("a", &["+AA"])).unwrap();
        let reader = BitReader::new(b"????");
        assert_matches!(loader.pick(&reader), Err(Error::TemplateNotFound(0)));
    }

    #[test]
    fn next_message_search() {
        let mut loader = TemplateLoader::new();
        loader.add(&coded_schema("a", &["+AA"])).unwrap();
        loader.add(&coded_schema("b", &["#B"])).unwrap();

        let buf = b"+AAx..#By..+AAz";
        let reader = BitReader::new(buf);
        // search starts one past the current position
        assert_eq!(loader.next_message_index(&reader), Some(6));

        let mut reader = BitReader::new(buf);
        reader.set_position_bytes(6);
        assert_eq!(loader.next_message_index(&reader), Some(11));

        let mut reader = BitReader::new(buf);
        reader.set_position_bytes(11);
        assert_eq!(loader.next_message_index(&reader), None);
    }

    #[test]
    fn lps_tables() {
        assert_eq!(lps_table(b"AABA"), vec![0, 1, 0, 1]);
        assert_eq!(kmp_find(b"xxAABAx", b"AABA", &lps_table(b"AABA")), Some(2));
        assert_eq!(kmp_find(b"xxAAB", b"AABA", &lps_table(b"AABA")), None);
    }
}
