use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::uuid::GattUuid;

/// AD type tags understood by the decoder.
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const INCOMPLETE_UUID16: u8 = 0x02;
    pub const COMPLETE_UUID16: u8 = 0x03;
    pub const INCOMPLETE_UUID32: u8 = 0x04;
    pub const COMPLETE_UUID32: u8 = 0x05;
    pub const INCOMPLETE_UUID128: u8 = 0x06;
    pub const COMPLETE_UUID128: u8 = 0x07;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const TX_POWER_LEVEL: u8 = 0x0A;
    pub const SERVICE_DATA_UUID16: u8 = 0x16;
    pub const SERVICE_DATA_UUID32: u8 = 0x20;
    pub const SERVICE_DATA_UUID128: u8 = 0x21;
    pub const MANUFACTURER_SPECIFIC: u8 = 0xFF;
}

/// Maximum legacy advertising payload length.
pub const MAX_ADVERTISING_PAYLOAD: usize = 31;

/// One raw `(type, data)` record from an advertising payload.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct AdRecord {
    ad_type: u8,
    data: Vec<u8>,
}

impl AdRecord {
    /// Creates a record from its type tag and body.
    #[must_use]
    pub fn new(ad_type: u8, data: Vec<u8>) -> Self {
        Self { ad_type, data }
    }

    /// Returns the AD type tag.
    #[must_use]
    pub fn ad_type(&self) -> u8 {
        self.ad_type
    }

    /// Returns the record body without the length and type bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Encodes the record as `len, type, data...`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(self.data.len() + 2);
        encoded.push(u8::try_from(self.data.len() + 1).unwrap_or(u8::MAX));
        encoded.push(self.ad_type);
        encoded.extend_from_slice(&self.data);
        encoded
    }
}

/// Which local-name record supplied the name.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum LocalNameKind {
    #[display("complete")]
    Complete,
    #[display("shortened")]
    Shortened,
}

/// An advertised local name.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct LocalName {
    pub name: String,
    pub kind: LocalNameKind,
}

/// Manufacturer-specific data keyed by the little-endian company identifier.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ManufacturerData {
    pub company_id: u16,
    pub payload: Vec<u8>,
}

impl ManufacturerData {
    /// Parses a `0xFF` record body.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (id, payload) = data.split_first_chunk::<2>()?;
        Some(Self {
            company_id: u16::from_le_bytes(*id),
            payload: payload.to_vec(),
        })
    }

    /// Re-encodes this value as a `0xFF` record.
    #[must_use]
    pub fn to_record(&self) -> AdRecord {
        let mut data = Vec::with_capacity(self.payload.len() + 2);
        data.extend_from_slice(&self.company_id.to_le_bytes());
        data.extend_from_slice(&self.payload);
        AdRecord::new(ad_type::MANUFACTURER_SPECIFIC, data)
    }
}

/// Service data advertised alongside a service UUID.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ServiceData {
    pub uuid: GattUuid,
    pub payload: Vec<u8>,
}

/// Structured view of one advertisement plus its scan response.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct Advertisement {
    flags: Option<u8>,
    local_name: Option<LocalName>,
    service_uuids: Vec<GattUuid>,
    service_data: Vec<ServiceData>,
    manufacturer_data: Vec<ManufacturerData>,
    tx_power: Option<i8>,
    records: Vec<AdRecord>,
    adv_data: Vec<u8>,
    scan_resp: Vec<u8>,
}

impl Advertisement {
    /// Decodes an advertising payload and an optional scan response.
    ///
    /// Malformed records never fail the decode; the fields they would have
    /// supplied are left empty.
    ///
    /// ```
    /// let adv = blelink::Advertisement::decode(
    ///     &[0x02, 0x01, 0x06, 0x05, 0x09, b'P', b'u', b'c', b'k'],
    ///     &[],
    /// );
    /// assert_eq!(Some(0x06), adv.flags());
    /// assert_eq!(Some("Puck"), adv.local_name());
    /// ```
    #[must_use]
    pub fn decode(adv_data: &[u8], scan_resp: &[u8]) -> Self {
        let mut advertisement = Self {
            adv_data: adv_data.to_vec(),
            scan_resp: scan_resp.to_vec(),
            ..Self::default()
        };

        for record in split_records(adv_data).chain(split_records(scan_resp)) {
            advertisement.apply(&record);
            advertisement.records.push(record);
        }

        advertisement
    }

    fn apply(&mut self, record: &AdRecord) {
        let data = record.data();
        match record.ad_type() {
            ad_type::FLAGS => match data.first() {
                Some(flags) => self.flags = Some(*flags),
                None => trace!("skipping empty flags record"),
            },
            ad_type::INCOMPLETE_UUID16 | ad_type::COMPLETE_UUID16 => self.push_uuids(data, 2),
            ad_type::INCOMPLETE_UUID32 | ad_type::COMPLETE_UUID32 => self.push_uuids(data, 4),
            ad_type::INCOMPLETE_UUID128 | ad_type::COMPLETE_UUID128 => self.push_uuids(data, 16),
            ad_type::SHORTENED_LOCAL_NAME => {
                if self.local_name.is_none() {
                    self.local_name = Some(LocalName {
                        name: String::from_utf8_lossy(data).into_owned(),
                        kind: LocalNameKind::Shortened,
                    });
                }
            }
            ad_type::COMPLETE_LOCAL_NAME => {
                self.local_name = Some(LocalName {
                    name: String::from_utf8_lossy(data).into_owned(),
                    kind: LocalNameKind::Complete,
                });
            }
            ad_type::TX_POWER_LEVEL => match data.first() {
                Some(level) => self.tx_power = Some(i8::from_le_bytes([*level])),
                None => trace!("skipping empty tx power record"),
            },
            ad_type::SERVICE_DATA_UUID16 => self.push_service_data(data, 2),
            ad_type::SERVICE_DATA_UUID32 => self.push_service_data(data, 4),
            ad_type::SERVICE_DATA_UUID128 => self.push_service_data(data, 16),
            ad_type::MANUFACTURER_SPECIFIC => match ManufacturerData::parse(data) {
                Some(manufacturer) => self.manufacturer_data.push(manufacturer),
                None => trace!(len = data.len(), "skipping undersized manufacturer record"),
            },
            other => trace!(ad_type = other, "keeping unrecognised record raw"),
        }
    }

    fn push_uuids(&mut self, data: &[u8], width: usize) {
        for chunk in data.chunks_exact(width) {
            let uuid = GattUuid::from_bytes(chunk, true);
            if !self.service_uuids.contains(&uuid) {
                self.service_uuids.push(uuid);
            }
        }
    }

    fn push_service_data(&mut self, data: &[u8], width: usize) {
        if data.len() < width {
            trace!(len = data.len(), width, "skipping undersized service data record");
            return;
        }
        let (uuid, payload) = data.split_at(width);
        self.service_data.push(ServiceData {
            uuid: GattUuid::from_bytes(uuid, true),
            payload: payload.to_vec(),
        });
    }

    /// Returns the advertising flags byte.
    #[must_use]
    pub fn flags(&self) -> Option<u8> {
        self.flags
    }

    /// Returns the local name, preferring the complete form.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_ref().map(|local| local.name.as_str())
    }

    /// Returns the local name together with the record kind it came from.
    #[must_use]
    pub fn local_name_record(&self) -> Option<&LocalName> {
        self.local_name.as_ref()
    }

    /// Returns advertised service UUIDs in first-seen order.
    #[must_use]
    pub fn service_uuids(&self) -> &[GattUuid] {
        &self.service_uuids
    }

    /// Returns advertised service data entries.
    #[must_use]
    pub fn service_data(&self) -> &[ServiceData] {
        &self.service_data
    }

    /// Returns manufacturer data entries.
    #[must_use]
    pub fn manufacturer_data(&self) -> &[ManufacturerData] {
        &self.manufacturer_data
    }

    /// Returns the advertised TX power level in dBm.
    #[must_use]
    pub fn tx_power(&self) -> Option<i8> {
        self.tx_power
    }

    /// Returns every raw record, advertising data first.
    #[must_use]
    pub fn records(&self) -> &[AdRecord] {
        &self.records
    }

    /// Returns the body of the first record with the given type.
    #[must_use]
    pub fn find_record(&self, ad_type: u8) -> Option<&[u8]> {
        self.records
            .iter()
            .find(|record| record.ad_type() == ad_type)
            .map(AdRecord::data)
    }

    /// Returns the raw advertising bytes.
    #[must_use]
    pub fn adv_data(&self) -> &[u8] {
        &self.adv_data
    }

    /// Returns the raw scan-response bytes.
    #[must_use]
    pub fn scan_resp(&self) -> &[u8] {
        &self.scan_resp
    }

    /// Parses the first iBeacon-style manufacturer record, if any.
    #[must_use]
    pub fn ibeacon(&self) -> Option<IBeacon> {
        self.find_record(ad_type::MANUFACTURER_SPECIFIC)
            .and_then(IBeacon::parse)
    }
}

/// Splits a payload into records, stopping at the first truncated record.
fn split_records(payload: &[u8]) -> impl Iterator<Item = AdRecord> + '_ {
    let mut index = 0usize;
    std::iter::from_fn(move || {
        while index < payload.len() {
            let record_len = usize::from(payload[index]);
            if record_len == 0 {
                index += 1;
                continue;
            }

            let type_index = index + 1;
            let record_end = type_index + record_len;
            if record_end > payload.len() {
                trace!(
                    offset = index,
                    record_len,
                    available = payload.len() - type_index,
                    "truncated advertising record"
                );
                index = payload.len();
                return None;
            }

            index = record_end;
            return Some(AdRecord::new(
                payload[type_index],
                payload[type_index + 1..record_end].to_vec(),
            ));
        }
        None
    })
}

/// A 25-byte iBeacon-style manufacturer record.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct IBeacon {
    pub company_id: u16,
    pub uuid: GattUuid,
    pub major: u16,
    pub minor: u16,
    pub measured_power: i8,
}

impl IBeacon {
    const LENGTH: usize = 25;
    const PREFIX: [u8; 2] = [0x02, 0x15];

    /// Parses a manufacturer record body (company id included).
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() != Self::LENGTH || data[2..4] != Self::PREFIX {
            return None;
        }

        Some(Self {
            company_id: u16::from_le_bytes([data[0], data[1]]),
            uuid: GattUuid::from_bytes(&data[4..20], false),
            major: u16::from_be_bytes([data[20], data[21]]),
            minor: u16::from_be_bytes([data[22], data[23]]),
            measured_power: i8::from_le_bytes([data[24]]),
        })
    }
}

/// Errors returned when building an advertising payload.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum AdvertisementError {
    #[error("advertising payload is {len} bytes; at most {MAX_ADVERTISING_PAYLOAD} fit")]
    PayloadTooLong { len: usize },
    #[error("service UUID `{uuid}` is not valid hex")]
    InvalidServiceUuid { uuid: String },
}

/// Fields advertised by the local device in the peripheral role.
#[derive(Debug, Clone, Default, Eq, PartialEq, bon::Builder)]
pub struct AdvertisementData {
    flags: Option<u8>,
    #[builder(into)]
    local_name: Option<String>,
    #[builder(default)]
    service_uuids: Vec<GattUuid>,
    manufacturer_data: Option<ManufacturerData>,
    tx_power: Option<i8>,
}

impl AdvertisementData {
    /// Encodes the fields as a legacy advertising payload.
    ///
    /// # Errors
    ///
    /// Returns an error when a UUID is not hex or the payload exceeds 31 bytes.
    pub fn encode(&self) -> Result<Vec<u8>, AdvertisementError> {
        let mut records = Vec::new();
        if let Some(flags) = self.flags {
            records.push(AdRecord::new(ad_type::FLAGS, vec![flags]));
        }
        for (width, tag) in [
            (2, ad_type::COMPLETE_UUID16),
            (4, ad_type::COMPLETE_UUID32),
            (16, ad_type::COMPLETE_UUID128),
        ] {
            let mut body = Vec::new();
            for uuid in &self.service_uuids {
                let bytes = uuid
                    .to_le_bytes()
                    .ok_or_else(|| AdvertisementError::InvalidServiceUuid {
                        uuid: uuid.to_string(),
                    })?;
                if bytes.len() == width {
                    body.extend_from_slice(&bytes);
                }
            }
            if !body.is_empty() {
                records.push(AdRecord::new(tag, body));
            }
        }
        if let Some(level) = self.tx_power {
            records.push(AdRecord::new(ad_type::TX_POWER_LEVEL, level.to_le_bytes().to_vec()));
        }
        if let Some(manufacturer) = &self.manufacturer_data {
            records.push(manufacturer.to_record());
        }
        if let Some(name) = &self.local_name {
            records.push(AdRecord::new(
                ad_type::COMPLETE_LOCAL_NAME,
                name.as_bytes().to_vec(),
            ));
        }

        let payload: Vec<u8> = records.iter().flat_map(AdRecord::encode).collect();
        if payload.len() > MAX_ADVERTISING_PAYLOAD {
            return Err(AdvertisementError::PayloadTooLong { len: payload.len() });
        }
        Ok(payload)
    }
}
