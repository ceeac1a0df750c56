use super::{BundleError, codec};

pub(crate) const BURN_SECTION_MAGIC: u32 = 0x00F1_4300;
pub(crate) const BURN_SECTION_VERSION: u32 = 3;
pub(crate) const BURN_SECTION_COMPATIBLE_VERSION: u32 = 2;
pub(crate) const CABINET_CONTAINER_FORMAT: u32 = 1;

/// Fixed header plus one container size slot.
pub(crate) const BURN_SECTION_MIN_SIZE: usize = 52;

const OFFSET_MAGIC: usize = 0;
const OFFSET_VERSION: usize = 4;
const OFFSET_GUID: usize = 8;
const OFFSET_STUB_SIZE: usize = 24;
pub(crate) const OFFSET_ORIGINAL_CHECKSUM: usize = 28;
pub(crate) const OFFSET_ORIGINAL_SIGNATURE_OFFSET: usize = 32;
pub(crate) const OFFSET_ORIGINAL_SIGNATURE_SIZE: usize = 36;
const OFFSET_CONTAINER_FORMAT: usize = 40;
pub(crate) const OFFSET_CONTAINER_COUNT: usize = 44;
pub(crate) const OFFSET_CONTAINER_SIZES: usize = 48;

/// The parsed payload of a `.wixburn` section.
///
/// <https://github.com/wixtoolset/wix/blob/main/src/burn/stub/StubSection.cpp>
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BurnSection {
    pub version: u32,
    pub guid: uuid::Bytes,
    pub stub_size: u32,
    pub original_checksum: u32,
    pub original_signature_offset: u32,
    pub original_signature_size: u32,
    pub container_format: u32,
    /// Byte length of each attached container in on-disk order. Slot 0 is
    /// always the UX container.
    pub container_sizes: Vec<u32>,
}

impl BurnSection {
    /// Validates and decodes a section payload.
    ///
    /// Checks run in the order magic, version, container format, then the
    /// container count against the space physically available for the size
    /// table; the first failure wins and no partial header is returned.
    pub fn parse(bytes: &[u8]) -> Result<Self, BundleError> {
        if bytes.len() < BURN_SECTION_MIN_SIZE {
            return Err(BundleError::BurnSectionTooSmall);
        }
        if codec::read_u32(bytes, OFFSET_MAGIC) != BURN_SECTION_MAGIC {
            return Err(BundleError::InvalidBundle);
        }
        let version = codec::read_u32(bytes, OFFSET_VERSION);
        if version != BURN_SECTION_VERSION && version != BURN_SECTION_COMPATIBLE_VERSION {
            return Err(BundleError::IncompatibleVersion(version));
        }
        let container_format = codec::read_u32(bytes, OFFSET_CONTAINER_FORMAT);
        if container_format != CABINET_CONTAINER_FORMAT {
            return Err(BundleError::InvalidBundle);
        }
        let container_count = codec::read_u32(bytes, OFFSET_CONTAINER_COUNT) as usize;
        let capacity = (bytes.len() - OFFSET_CONTAINER_SIZES) / size_of::<u32>();
        if container_count > capacity {
            return Err(BundleError::InvalidBundle);
        }

        let mut guid = uuid::Bytes::default();
        guid.copy_from_slice(&bytes[OFFSET_GUID..OFFSET_GUID + size_of::<uuid::Bytes>()]);
        let container_sizes = (0..container_count)
            .map(|slot| codec::read_u32(bytes, OFFSET_CONTAINER_SIZES + slot * size_of::<u32>()))
            .collect();

        Ok(Self {
            version,
            guid,
            stub_size: codec::read_u32(bytes, OFFSET_STUB_SIZE),
            original_checksum: codec::read_u32(bytes, OFFSET_ORIGINAL_CHECKSUM),
            original_signature_offset: codec::read_u32(bytes, OFFSET_ORIGINAL_SIGNATURE_OFFSET),
            original_signature_size: codec::read_u32(bytes, OFFSET_ORIGINAL_SIGNATURE_SIZE),
            container_format,
            container_sizes,
        })
    }

    /// Encodes the header into a fresh buffer of
    /// `BURN_SECTION_MIN_SIZE + 4 * container count` bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes =
            vec![0; BURN_SECTION_MIN_SIZE + self.container_sizes.len() * size_of::<u32>()];
        codec::write_u32(&mut bytes, OFFSET_MAGIC, BURN_SECTION_MAGIC);
        codec::write_u32(&mut bytes, OFFSET_VERSION, self.version);
        bytes[OFFSET_GUID..OFFSET_GUID + size_of::<uuid::Bytes>()].copy_from_slice(&self.guid);
        codec::write_u32(&mut bytes, OFFSET_STUB_SIZE, self.stub_size);
        codec::write_u32(&mut bytes, OFFSET_ORIGINAL_CHECKSUM, self.original_checksum);
        codec::write_u32(
            &mut bytes,
            OFFSET_ORIGINAL_SIGNATURE_OFFSET,
            self.original_signature_offset,
        );
        codec::write_u32(
            &mut bytes,
            OFFSET_ORIGINAL_SIGNATURE_SIZE,
            self.original_signature_size,
        );
        codec::write_u32(&mut bytes, OFFSET_CONTAINER_FORMAT, self.container_format);
        codec::write_u32(&mut bytes, OFFSET_CONTAINER_COUNT, self.container_count());
        for (slot, size) in self.container_sizes.iter().enumerate() {
            codec::write_u32(&mut bytes, OFFSET_CONTAINER_SIZES + slot * size_of::<u32>(), *size);
        }
        bytes
    }

    pub fn container_count(&self) -> u32 {
        self.container_sizes.len() as u32
    }

    pub fn ux_container_size(&self) -> u32 {
        self.container_sizes.first().copied().unwrap_or_default()
    }

    /// Resolves the byte offset at which attached container data begins,
    /// given the live Authenticode location of the file this header came
    /// from. First applicable rule wins.
    pub fn engine_size(&self, signature_offset: u32, signature_size: u32) -> u64 {
        if self.original_signature_offset > 0 {
            // The header was normalized after signing; that recorded
            // boundary is authoritative.
            return u64::from(self.original_signature_offset)
                + u64::from(self.original_signature_size);
        }
        if signature_offset > 0 && self.container_sizes.len() < 2 {
            // Signed engine whose header predates normalization. With
            // chained containers attached the signature spans the whole
            // bundle instead, so it cannot mark the engine boundary.
            return u64::from(signature_offset) + u64::from(signature_size);
        }
        u64::from(self.stub_size) + u64::from(self.ux_container_size())
    }
}
