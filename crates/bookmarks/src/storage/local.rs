//! Embedded index store using Tantivy

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Term, Value};
use tantivy::snippet::{Snippet, SnippetGenerator};
use tantivy::{
    DocId, DocSet, Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, Searcher,
    TERMINATED, TantivyDocument,
};

use super::schema::{self, SchemaFields, build_schema, check_compatible};
use super::tags::decode_tag_values;
use super::{
    BookmarkField, Deadline, FieldTerms, IndexError, IndexStore, QueryPage, QueryRequest, RawHit,
    StoredFields, TermCount,
};
use crate::models::{Bookmark, BookmarkId};
use crate::search::html_escape;

/// Heap size for the index writer (50MB)
const WRITER_HEAP_SIZE: usize = 50_000_000;

/// Longest stretch of a field the snippet generator will cover
const HIGHLIGHT_MAX_CHARS: usize = 1 << 20;

/// Dictionary terms read between deadline checks
const TERMS_PER_CHECK: usize = 1024;

/// Markers around matched spans in fragments
pub const HIGHLIGHT_PRE: &str = "<mark>";
pub const HIGHLIGHT_POST: &str = "</mark>";

/// Text fields that get highlight fragments
const HIGHLIGHTED: [BookmarkField; 3] = [
    BookmarkField::Url,
    BookmarkField::Title,
    BookmarkField::Description,
];

/// Bookmark index backed by a Tantivy directory
///
/// Readers are lock-free snapshots. Writes go through a single lazily created
/// writer; each write commits and reloads the reader before returning, so a
/// caller always reads its own writes.
pub struct TantivyStore {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
    writer: Mutex<Option<IndexWriter>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for TantivyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyStore")
            .field("index", &"<tantivy::Index>")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl TantivyStore {
    /// Open the index at `path`, creating it with the bookmark schema if the
    /// directory holds no index yet
    ///
    /// An existing index keeps its on-disk schema; it is only checked for
    /// compatibility, never rewritten.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| {
            IndexError::unavailable(format!(
                "Failed to create index directory {}: {}",
                path.display(),
                e
            ))
        })?;

        let dir = MmapDirectory::open(path).map_err(|e| {
            IndexError::unavailable(format!(
                "Failed to open index directory {}: {}",
                path.display(),
                e
            ))
        })?;

        let exists = Index::exists(&dir)
            .map_err(|e| IndexError::unavailable(format!("Failed to inspect index: {}", e)))?;

        let index = if exists {
            info!("Opening bookmark index at {}", path.display());
            let index = Index::open(dir)?;
            Self::check_existing(&index)?;
            index
        } else {
            info!("Creating bookmark index at {}", path.display());
            Index::create(dir, build_schema(), IndexSettings::default())?
        };

        Self::from_index(index)
    }

    /// Create an in-memory index (for testing)
    pub fn in_memory() -> Result<Self, IndexError> {
        Self::from_index(Index::create_in_ram(build_schema()))
    }

    fn from_index(index: Index) -> Result<Self, IndexError> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let fields = SchemaFields::new(&index.schema())?;

        Ok(Self {
            index,
            reader,
            fields,
            writer: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Reject indexes written with another layout or schema version
    fn check_existing(index: &Index) -> Result<(), IndexError> {
        check_compatible(&index.schema())?;

        let metas = index.load_metas()?;
        match metas.payload {
            Some(ref payload) if *payload != schema::version_payload() => {
                error!(
                    "Index schema version {} does not match {}",
                    payload,
                    schema::version_payload()
                );
                Err(IndexError::schema(format!(
                    "index was written as {}, expected {}",
                    payload,
                    schema::version_payload()
                )))
            }
            _ => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<(), IndexError> {
        if self.closed.load(Ordering::Acquire) {
            Err(IndexError::unavailable("index is closed"))
        } else {
            Ok(())
        }
    }

    /// Get or create the writer
    fn writer(&self) -> Result<MutexGuard<'_, Option<IndexWriter>>, IndexError> {
        self.ensure_open()?;
        let mut guard = self
            .writer
            .lock()
            .map_err(|e| IndexError::io(format!("Lock poisoned: {}", e)))?;
        if guard.is_none() {
            *guard = Some(self.index.writer(WRITER_HEAP_SIZE)?);
        }
        Ok(guard)
    }

    /// Apply `change` to the writer, then commit and reload the reader
    fn write<F>(&self, change: F) -> Result<(), IndexError>
    where
        F: FnOnce(&mut IndexWriter, &SchemaFields) -> Result<(), IndexError>,
    {
        let mut guard = self.writer()?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| IndexError::unavailable("index writer missing"))?;

        if let Err(e) = change(writer, &self.fields) {
            writer.rollback()?;
            return Err(e);
        }

        let mut prepared = writer.prepare_commit()?;
        prepared.set_payload(&schema::version_payload());
        prepared.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    fn to_document(&self, bookmark: &Bookmark) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        doc.add_text(self.fields.id, bookmark.id.as_str());
        doc.add_text(self.fields.url, &bookmark.url);
        doc.add_text(self.fields.title, &bookmark.title);
        doc.add_text(self.fields.description, &bookmark.description);
        for tag in &bookmark.tags {
            doc.add_text(self.fields.tags, tag);
        }
        doc.add_date(
            self.fields.creation_date,
            tantivy::DateTime::from_timestamp_micros(bookmark.creation_date.timestamp_micros()),
        );
        doc
    }

    fn parse_query(&self, text: &str) -> Result<Box<dyn Query>, IndexError> {
        if text.trim().is_empty() {
            return Ok(Box::new(AllQuery));
        }
        let parser = QueryParser::for_index(&self.index, self.fields.searchable());
        Ok(parser.parse_query(text)?)
    }

    fn first_text<'a>(&self, doc: &'a TantivyDocument, field: BookmarkField) -> Option<&'a str> {
        doc.get_first(self.fields.field(field))
            .and_then(|v| v.as_str())
    }

    /// Read the requested stored fields of a document
    fn read_fields(
        &self,
        doc: &TantivyDocument,
        wanted: &[BookmarkField],
    ) -> Result<StoredFields, IndexError> {
        let mut stored = StoredFields::default();
        for field in wanted {
            match field {
                BookmarkField::Url => {
                    stored.url = self.first_text(doc, *field).map(str::to_string);
                }
                BookmarkField::Title => {
                    stored.title = self.first_text(doc, *field).map(str::to_string);
                }
                BookmarkField::Description => {
                    stored.description = self.first_text(doc, *field).map(str::to_string);
                }
                BookmarkField::Tags => {
                    stored.tags =
                        decode_tag_values(doc.get_all(self.fields.tags).map(|v| v.as_str()))?;
                }
                BookmarkField::CreationDate => {
                    stored.creation_date = doc
                        .get_first(self.fields.creation_date)
                        .and_then(|v| v.as_datetime())
                        .and_then(|d| DateTime::<Utc>::from_timestamp_micros(d.into_timestamp_micros()));
                }
            }
        }
        Ok(stored)
    }

    fn read_id(&self, doc: &TantivyDocument) -> Result<BookmarkId, IndexError> {
        doc.get_first(self.fields.id)
            .and_then(|v| v.as_str())
            .map(BookmarkId::from)
            .ok_or_else(|| IndexError::schema("stored document has no id"))
    }

    /// Count documents of a postings list that are not deleted
    fn count_alive<D: DocSet>(postings: &mut D, is_alive: impl Fn(DocId) -> bool) -> u64 {
        let mut count = 0;
        let mut doc = postings.doc();
        while doc != TERMINATED {
            if is_alive(doc) {
                count += 1;
            }
            doc = postings.advance();
        }
        count
    }

    /// Prefix terms of one field merged across segments, in dictionary order
    fn field_terms(
        &self,
        searcher: &Searcher,
        field: BookmarkField,
        prefix: &str,
        deadline: &Deadline,
    ) -> Result<Vec<TermCount>, IndexError> {
        if !field.is_text() {
            return Err(IndexError::schema(format!(
                "{} has no term dictionary",
                field.name()
            )));
        }
        let schema_field = self.fields.field(field);
        let prefix = prefix.as_bytes();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();

        for segment in searcher.segment_readers() {
            deadline.check()?;
            let inverted = segment.inverted_index(schema_field)?;
            let alive = segment.alive_bitset();
            let mut stream = inverted.terms().range().ge(prefix).into_stream()?;

            let mut read = 0usize;
            while stream.advance() {
                let key = stream.key();
                if !key.starts_with(prefix) {
                    break;
                }
                read += 1;
                if read % TERMS_PER_CHECK == 0 {
                    deadline.check()?;
                }

                let term_info = stream.value();
                let count = match alive {
                    None => u64::from(term_info.doc_freq),
                    Some(bitset) => {
                        let mut postings = inverted
                            .read_postings_from_terminfo(term_info, IndexRecordOption::Basic)?;
                        Self::count_alive(&mut postings, |doc| bitset.is_alive(doc))
                    }
                };
                if count == 0 {
                    continue;
                }
                *counts
                    .entry(String::from_utf8_lossy(key).into_owned())
                    .or_insert(0) += count;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(term, count)| TermCount { term, count })
            .collect())
    }
}

/// Per-field snippet generators for one query
struct Highlighter {
    generators: Vec<(BookmarkField, SnippetGenerator)>,
}

impl Highlighter {
    fn new(searcher: &Searcher, query: &dyn Query, fields: &SchemaFields) -> Result<Self, IndexError> {
        let mut generators = Vec::with_capacity(HIGHLIGHTED.len());
        for field in HIGHLIGHTED {
            let mut generator = SnippetGenerator::create(searcher, query, fields.field(field))?;
            generator.set_max_num_chars(HIGHLIGHT_MAX_CHARS);
            generators.push((field, generator));
        }
        Ok(Self { generators })
    }

    /// Highlighted HTML for every field with a matched span
    fn fragments(&self, stored: &StoredFields) -> HashMap<BookmarkField, String> {
        let mut fragments = HashMap::new();
        for (field, generator) in &self.generators {
            let Some(text) = stored.text(*field) else {
                continue;
            };
            if let Some(html) = mark_matches(text, &generator.snippet(text)) {
                fragments.insert(*field, html);
            }
        }
        fragments
    }
}

/// Escape the whole of `text`, wrapping the snippet's matched spans in
/// highlight markers
///
/// A snippet runs from its first to its last token, so the text around it is
/// escaped and put back on either side.
fn mark_matches(text: &str, snippet: &Snippet) -> Option<String> {
    if snippet.highlighted().is_empty() {
        return None;
    }
    let fragment = snippet.fragment();
    let start = text.find(fragment)?;

    let mut html = html_escape(&text[..start]);
    let mut cursor = 0;
    for range in snippet.highlighted() {
        if range.start < cursor || range.end > fragment.len() {
            continue;
        }
        html.push_str(&html_escape(&fragment[cursor..range.start]));
        html.push_str(HIGHLIGHT_PRE);
        html.push_str(&html_escape(&fragment[range.clone()]));
        html.push_str(HIGHLIGHT_POST);
        cursor = range.end;
    }
    html.push_str(&html_escape(&fragment[cursor..]));
    html.push_str(&html_escape(&text[start + fragment.len()..]));
    Some(html)
}

impl IndexStore for TantivyStore {
    fn save(&self, bookmark: &Bookmark, deadline: &Deadline) -> Result<(), IndexError> {
        deadline.check()?;
        let doc = self.to_document(bookmark);
        self.write(|writer, fields| {
            // Upsert: drop any previous document under this id
            writer.delete_term(Term::from_field_text(fields.id, bookmark.id.as_str()));
            writer.add_document(doc)?;
            Ok(())
        })?;
        debug!("Saved bookmark {}", bookmark.id);
        Ok(())
    }

    fn get_by_id(&self, id: &BookmarkId, deadline: &Deadline) -> Result<Bookmark, IndexError> {
        self.ensure_open()?;
        deadline.check()?;
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.id, id.as_str()),
            IndexRecordOption::Basic,
        );
        let top_docs = searcher.search(&query, &TopDocs::with_limit(2))?;

        match top_docs.as_slice() {
            [(_, address)] => {
                let doc: TantivyDocument = searcher.doc(*address)?;
                self.read_fields(&doc, &BookmarkField::ALL)?
                    .into_bookmark(id.clone())
            }
            [] => Err(IndexError::not_found(id.as_str())),
            _ => {
                error!("Index holds more than one document for bookmark {}", id);
                Err(IndexError::not_found(id.as_str()))
            }
        }
    }

    fn delete(&self, id: &BookmarkId, deadline: &Deadline) -> Result<(), IndexError> {
        deadline.check()?;
        self.write(|writer, fields| {
            writer.delete_term(Term::from_field_text(fields.id, id.as_str()));
            Ok(())
        })?;
        debug!("Deleted bookmark {}", id);
        Ok(())
    }

    fn query(&self, request: &QueryRequest, deadline: &Deadline) -> Result<QueryPage, IndexError> {
        self.ensure_open()?;
        deadline.check()?;
        let searcher = self.reader.searcher();
        let query = self.parse_query(&request.query)?;

        // Never size the collector beyond the live corpus
        let live_docs = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
        let limit = request.limit.min(live_docs);
        if limit == 0 {
            let total = searcher.search(&*query, &Count)?;
            return Ok(QueryPage {
                total_hits: total as u64,
                hits: Vec::new(),
            });
        }

        let collector = (
            TopDocs::with_limit(limit).and_offset(request.offset),
            Count,
        );
        let (top_docs, total) = searcher.search(&*query, &collector)?;
        deadline.check()?;

        let highlighter = if request.highlight {
            Some(Highlighter::new(&searcher, &*query, &self.fields)?)
        } else {
            None
        };

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            deadline.check()?;
            let doc: TantivyDocument = searcher.doc(address)?;
            let fields = self.read_fields(&doc, &request.fields)?;
            let fragments = highlighter
                .as_ref()
                .map(|h| h.fragments(&fields))
                .unwrap_or_default();
            hits.push(RawHit {
                id: self.read_id(&doc)?,
                score,
                fields,
                fragments,
            });
        }

        debug!(
            "Query {:?} matched {} documents, returning {}",
            request.query,
            total,
            hits.len()
        );
        Ok(QueryPage {
            total_hits: total as u64,
            hits,
        })
    }

    fn enumerate_prefix_terms(
        &self,
        fields: &[BookmarkField],
        prefix: &str,
        deadline: &Deadline,
    ) -> Result<Vec<FieldTerms>, IndexError> {
        self.ensure_open()?;
        deadline.check()?;
        let searcher = self.reader.searcher();
        fields
            .iter()
            .map(|field| {
                Ok(FieldTerms {
                    field: *field,
                    terms: self.field_terms(&searcher, *field, prefix, deadline)?,
                })
            })
            .collect()
    }

    fn close(&self) -> Result<(), IndexError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut guard = self
            .writer
            .lock()
            .map_err(|e| IndexError::io(format!("Lock poisoned: {}", e)))?;
        if let Some(writer) = guard.take() {
            writer.wait_merging_threads()?;
        }
        info!("Closed bookmark index");
        Ok(())
    }
}
