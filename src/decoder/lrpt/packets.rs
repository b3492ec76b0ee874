pub const VCDU_LEN: usize = 892;
const ZONE_START: usize = 10;
const FILL_VCID: u8 = 63;
const NO_HEADER: usize = 0x7FF;
const PACKET_HEADER_LEN: usize = 6;
const IDLE_APID: u16 = 2047;

/// Virtual channel data unit, the payload of one CADU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vcdu {
    bytes: Vec<u8>,
}

impl Vcdu {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        (bytes.len() == VCDU_LEN).then(|| Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn spacecraft_id(&self) -> u8 {
        (self.bytes[0] << 2) | (self.bytes[1] >> 6)
    }

    pub fn vcid(&self) -> u8 {
        self.bytes[1] & 0x3F
    }

    pub fn counter(&self) -> u32 {
        u32::from_be_bytes([0, self.bytes[2], self.bytes[3], self.bytes[4]])
    }

    pub fn is_fill(&self) -> bool {
        self.vcid() == FILL_VCID
    }

    /// Offset into the packet zone of the first packet header, if any.
    pub fn first_header_pointer(&self) -> Option<usize> {
        let fhp = (((self.bytes[8] & 0x07) as usize) << 8) | self.bytes[9] as usize;
        (fhp != NO_HEADER).then_some(fhp)
    }

    pub fn packet_zone(&self) -> &[u8] {
        &self.bytes[ZONE_START..]
    }
}

/// CCSDS space packet with its primary header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    bytes: Vec<u8>,
}

impl Packet {
    pub fn apid(&self) -> u16 {
        (((self.bytes[0] & 0x07) as u16) << 8) | self.bytes[1] as u16
    }

    pub fn sequence_count(&self) -> u16 {
        (((self.bytes[2] & 0x3F) as u16) << 8) | self.bytes[3] as u16
    }

    /// Data field after the primary header.
    pub fn data(&self) -> &[u8] {
        &self.bytes[PACKET_HEADER_LEN..]
    }

    fn expected_len(header: &[u8]) -> usize {
        PACKET_HEADER_LEN + (((header[4] as usize) << 8) | header[5] as usize) + 1
    }
}

/// Rebuilds space packets that span VCDU boundaries.
///
/// Continuity is tracked with the VCDU counter of the image channel. After a
/// gap the partial packet is discarded and parsing restarts at the first
/// header pointer.
#[derive(Debug, Default)]
pub struct PacketReassembler {
    partial: Vec<u8>,
    last_counter: Option<(u8, u32)>,
}

impl PacketReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one VCDU and collect the packets it completes.
    pub fn push(&mut self, vcdu: &Vcdu) -> Vec<Packet> {
        let mut packets = Vec::new();
        if vcdu.is_fill() {
            return packets;
        }

        let continuous = matches!(
            self.last_counter,
            Some((vcid, counter)) if vcid == vcdu.vcid() && (counter + 1) & 0xFF_FFFF == vcdu.counter()
        );
        self.last_counter = Some((vcdu.vcid(), vcdu.counter()));
        if !continuous && !self.partial.is_empty() {
            log::debug!("VCDU gap before counter {}, dropping partial packet", vcdu.counter());
            self.partial.clear();
        }

        let zone = vcdu.packet_zone();
        let header = vcdu.first_header_pointer().filter(|&p| p < zone.len());

        let Some(start) = header else {
            if !self.partial.is_empty() {
                self.extend(zone, &mut packets);
            }
            return packets;
        };

        if !self.partial.is_empty() {
            self.extend(&zone[..start], &mut packets);
            if !self.partial.is_empty() {
                log::debug!("Packet not complete at first header pointer, dropping");
                self.partial.clear();
            }
        }
        self.extend(&zone[start..], &mut packets);
        packets
    }

    /// Append bytes, emitting every packet that becomes complete.
    fn extend(&mut self, mut bytes: &[u8], packets: &mut Vec<Packet>) {
        while !bytes.is_empty() {
            if self.partial.len() < PACKET_HEADER_LEN {
                let take = (PACKET_HEADER_LEN - self.partial.len()).min(bytes.len());
                self.partial.extend_from_slice(&bytes[..take]);
                bytes = &bytes[take..];
                if self.partial.len() < PACKET_HEADER_LEN {
                    return;
                }
            }
            let total = Packet::expected_len(&self.partial);
            let take = (total - self.partial.len()).min(bytes.len());
            self.partial.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if self.partial.len() == total {
                let packet = Packet {
                    bytes: std::mem::take(&mut self.partial),
                };
                if packet.apid() != IDLE_APID {
                    packets.push(packet);
                }
            }
        }
    }
}
