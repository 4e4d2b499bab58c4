use shelfscan_scanner::ProductRecord;
use std::collections::HashSet;
use std::io::{Read, Write};

pub const CSV_HEADERS: [&str; 9] = [
    "Category",
    "Item Category",
    "Display Name",
    "Color",
    "URL",
    "Sale Price",
    "Original Price",
    "Sizes In Stock",
    "Sizes OOS",
];

/// Ordered product rows with unique canonical URLs.
///
/// The first record pushed for a URL wins; later ones are dropped, so the
/// order of first appearance is preserved.
#[derive(Debug, Clone, Default)]
pub struct CatalogDataset {
    records: Vec<ProductRecord>,
    seen: HashSet<String>,
}

impl CatalogDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when a record with the same URL is already present.
    pub fn push(&mut self, record: ProductRecord) -> bool {
        if !self.seen.insert(record.url.clone()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Appends records in order and returns how many were new.
    pub fn extend<I: IntoIterator<Item = ProductRecord>>(&mut self, records: I) -> usize {
        let mut added = 0;
        for record in records {
            if self.push(record) {
                added += 1;
            }
        }
        added
    }

    pub fn records(&self) -> &[ProductRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductRecord> {
        self.records.iter()
    }

    pub fn count_for(&self, category: &str) -> usize {
        self.records.iter().filter(|r| r.category == category).count()
    }

    /// Writes a header row (even for an empty dataset) and one row per record.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        wtr.write_record(CSV_HEADERS)?;
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, csv::Error> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(buf)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut dataset = Self::new();
        for row in rdr.deserialize::<ProductRecord>() {
            dataset.push(row?);
        }
        Ok(dataset)
    }
}
