//! # Image Section Table
//!
//! Sections of the loaded executable image, kept so reads of read-only
//! memory can be answered from the file without touching the target. Used
//! as the first front of memory transfers when the session is told to trust
//! read-only sections.

use object::{Object, ObjectSection, SectionKind};

use crate::exception::{ErrorKind, Exception, Result};

/// One mapped section with its file-provided contents.
#[derive(Debug, Clone)]
pub struct Section
{
    name: String,
    address: u64,
    data: Vec<u8>,
    readonly: bool,
}

impl Section
{
    /// Describe a section at its mapped address.
    #[must_use]
    pub fn new(name: impl Into<String>, address: u64, data: Vec<u8>, readonly: bool) -> Self
    {
        Section { name: name.into(), address, data, readonly }
    }

    /// Section name as it appears in the image.
    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// First mapped address of the section.
    #[must_use]
    pub const fn address(&self) -> u64
    {
        self.address
    }

    /// First address past the section.
    #[must_use]
    pub fn end(&self) -> u64
    {
        self.address.saturating_add(self.data.len() as u64)
    }

    /// Whether the section is immutable at run time.
    #[must_use]
    pub const fn is_readonly(&self) -> bool
    {
        self.readonly
    }

    fn contains(&self, offset: u64) -> bool
    {
        offset >= self.address && offset < self.end()
    }
}

/// Collection of image sections, addressable by memory offset.
#[derive(Debug, Clone, Default)]
pub struct SectionTable
{
    sections: Vec<Section>,
}

impl SectionTable
{
    /// An empty table.
    #[must_use]
    pub fn new() -> Self
    {
        SectionTable::default()
    }

    /// Parse an executable image and collect its loadable sections.
    ///
    /// Text and read-only data are marked immutable; sections without file
    /// contents are skipped.
    pub fn from_image_bytes(data: &[u8]) -> Result<SectionTable>
    {
        let file = object::File::parse(data)
            .map_err(|err| Exception::error(ErrorKind::InvalidArgument, format!("failed to parse image: {err}")))?;

        let mut table = SectionTable::new();
        for section in file.sections() {
            let kind = section.kind();
            let loadable = matches!(
                kind,
                SectionKind::Text | SectionKind::Data | SectionKind::ReadOnlyData | SectionKind::ReadOnlyString
            );
            if !loadable || section.size() == 0 {
                continue;
            }
            let bytes = section
                .uncompressed_data()
                .map_err(|err| Exception::error(ErrorKind::InvalidArgument, format!("failed to read section: {err}")))?;
            if bytes.is_empty() {
                continue;
            }
            let readonly = !matches!(kind, SectionKind::Data);
            table.insert(Section::new(
                section.name().unwrap_or(""),
                section.address(),
                bytes.into_owned(),
                readonly,
            ));
        }
        Ok(table)
    }

    /// Add a section, keeping the table ordered by address.
    pub fn insert(&mut self, section: Section)
    {
        let pos = self
            .sections
            .partition_point(|existing| existing.address() <= section.address());
        self.sections.insert(pos, section);
    }

    /// Number of sections.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.sections.len()
    }

    /// Whether the table holds no sections.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.sections.is_empty()
    }

    /// The sections, ordered by address.
    #[must_use]
    pub fn sections(&self) -> &[Section]
    {
        &self.sections
    }

    /// Serve a read at `offset` from a read-only section, if one covers it.
    ///
    /// Copies at most up to the end of the covering section; the caller
    /// loops for anything beyond it.
    pub(crate) fn read_readonly(&self, offset: u64, buf: &mut [u8]) -> Option<usize>
    {
        let section = self
            .sections
            .iter()
            .find(|section| section.readonly && section.contains(offset))?;
        let start = (offset - section.address) as usize;
        let n = buf.len().min(section.data.len() - start);
        buf[..n].copy_from_slice(&section.data[start..start + n]);
        Some(n)
    }
}
