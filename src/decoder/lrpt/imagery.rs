use std::collections::BTreeMap;

use image::{DynamicImage, GrayImage, RgbImage};

use crate::decoder::lrpt::jpeg::{BlockDecoder, BLOCK_PIXELS};
use crate::decoder::lrpt::packets::Packet;

pub const STRIP_WIDTH: usize = 1568;
const STRIP_HEIGHT: usize = 8;
const BLOCKS_PER_PACKET: usize = 14;
const BLOCKS_PER_LINE: usize = STRIP_WIDTH / 8;
const IMAGE_APIDS: std::ops::RangeInclusive<u16> = 64..=69;

// Offsets inside the packet data field.
const MCU_ID: usize = 8;
const QUALITY: usize = 13;
const COMPRESSED: usize = 14;

const RED: u16 = 66;
const GREEN: u16 = 65;
const BLUE: u16 = 64;

#[derive(Debug, Default)]
struct Channel {
    /// Each strip is `STRIP_WIDTH * STRIP_HEIGHT` pixels, row major.
    strips: Vec<Vec<u8>>,
    last_mcu: Option<u8>,
}

impl Channel {
    fn pixel(&self, x: usize, y: usize) -> u8 {
        self.strips
            .get(y / STRIP_HEIGHT)
            .map_or(0, |strip| strip[(y % STRIP_HEIGHT) * STRIP_WIDTH + x])
    }

    fn height(&self) -> usize {
        self.strips.len() * STRIP_HEIGHT
    }
}

/// Collects imager packets per channel and renders the result.
#[derive(Default)]
pub struct ImageAssembler {
    blocks: BlockDecoder,
    channels: BTreeMap<u16, Channel>,
}

impl ImageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: &Packet) {
        let apid = packet.apid();
        if !IMAGE_APIDS.contains(&apid) {
            return;
        }
        let data = packet.data();
        if data.len() <= COMPRESSED {
            return;
        }
        let mcu_id = data[MCU_ID];
        let first_block = mcu_id as usize;
        if first_block >= BLOCKS_PER_LINE {
            log::debug!("APID {} has MCU id {} outside the line", apid, mcu_id);
            return;
        }
        let blocks = self
            .blocks
            .decode(&data[COMPRESSED..], data[QUALITY], BLOCKS_PER_PACKET);

        let channel = self.channels.entry(apid).or_default();
        if channel.last_mcu.map_or(true, |last| mcu_id <= last) {
            channel.strips.push(vec![0; STRIP_WIDTH * STRIP_HEIGHT]);
        }
        channel.last_mcu = Some(mcu_id);

        let Some(strip) = channel.strips.last_mut() else {
            return;
        };
        for (i, block) in blocks.iter().enumerate() {
            let x0 = (first_block + i) * 8;
            if x0 >= STRIP_WIDTH {
                break;
            }
            place_block(strip, x0, block);
        }
    }

    /// Channels seen so far with their strip counts.
    pub fn channels(&self) -> Vec<(u16, usize)> {
        self.channels
            .iter()
            .map(|(apid, c)| (*apid, c.strips.len()))
            .collect()
    }

    /// RGB when the three visible channels are present, otherwise the
    /// channel with the most strips in greyscale.
    pub fn render(&self) -> Option<DynamicImage> {
        if let (Some(r), Some(g), Some(b)) = (
            self.channels.get(&RED),
            self.channels.get(&GREEN),
            self.channels.get(&BLUE),
        ) {
            let height = r.height().max(g.height()).max(b.height());
            let image = RgbImage::from_fn(STRIP_WIDTH as u32, height as u32, |x, y| {
                let (x, y) = (x as usize, y as usize);
                image::Rgb([r.pixel(x, y), g.pixel(x, y), b.pixel(x, y)])
            });
            return Some(DynamicImage::ImageRgb8(image));
        }

        let channel = self
            .channels
            .values()
            .filter(|c| !c.strips.is_empty())
            .max_by_key(|c| c.strips.len())?;
        let image = GrayImage::from_fn(STRIP_WIDTH as u32, channel.height() as u32, |x, y| {
            image::Luma([channel.pixel(x as usize, y as usize)])
        });
        Some(DynamicImage::ImageLuma8(image))
    }
}

fn place_block(strip: &mut [u8], x0: usize, block: &[u8; BLOCK_PIXELS]) {
    for (row, pixels) in block.chunks_exact(8).enumerate() {
        let start = row * STRIP_WIDTH + x0;
        strip[start..start + 8].copy_from_slice(pixels);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decoder::lrpt::jpeg::tests::dc_blocks;
    use crate::decoder::lrpt::packets::tests::packet_bytes;
    use crate::decoder::lrpt::packets::{PacketReassembler, Vcdu};

    /// Data field of an imager packet with 14 DC-only blocks.
    pub(crate) fn imager_data(mcu_id: u8, dc: i32) -> Vec<u8> {
        let mut data = vec![0u8; COMPRESSED];
        data[MCU_ID] = mcu_id;
        data[QUALITY] = 50;
        data.extend(dc_blocks(&[dc; BLOCKS_PER_PACKET]));
        data
    }

    fn packet(apid: u16, sequence: u16, mcu_id: u8, dc: i32) -> Packet {
        // round trip through a VCDU to get a parsed packet
        let bytes = packet_bytes(apid, sequence, &imager_data(mcu_id, dc));
        let vcdus = crate::decoder::lrpt::packets::tests::vcdus(&bytes, &[0], 0);
        let mut reassembler = PacketReassembler::new();
        let mut packets = reassembler.push(&Vcdu::from_bytes(&vcdus[0]).unwrap());
        assert_eq!(packets.len(), 1);
        packets.remove(0)
    }

    /// One full line of packets for `apid`; the first packet has `dc`.
    fn line(apid: u16, dc: i32) -> Vec<Packet> {
        (0..BLOCKS_PER_LINE / BLOCKS_PER_PACKET)
            .map(|i| {
                let value = if i == 0 { dc } else { 0 };
                packet(apid, i as u16, (i * BLOCKS_PER_PACKET) as u8, value)
            })
            .collect()
    }

    #[test]
    fn greyscale_from_single_channel() {
        let mut assembler = ImageAssembler::new();
        for p in line(68, 0).iter().chain(line(68, 0).iter()) {
            assembler.push(p);
        }
        assert_eq!(assembler.channels(), vec![(68, 2)]);

        let image = assembler.render().unwrap().into_luma8();
        assert_eq!(image.dimensions(), (STRIP_WIDTH as u32, 16));
        assert!(image.pixels().all(|p| p.0[0] == 128));
    }

    #[test]
    fn rgb_from_visible_channels() {
        let mut assembler = ImageAssembler::new();
        for (apid, dc) in [(64, 5), (65, -5), (66, 10)] {
            for p in line(apid, dc) {
                assembler.push(&p);
            }
        }
        let image = assembler.render().unwrap().into_rgb8();
        assert_eq!(image.dimensions(), (STRIP_WIDTH as u32, 8));
        assert_eq!(image.get_pixel(0, 0).0, [148, 118, 138]);
        assert_eq!(image.get_pixel(200, 7).0, [128, 128, 128]);
    }

    #[test]
    fn missing_line_start_keeps_strip() {
        let mut assembler = ImageAssembler::new();
        let packets = line(64, 0);
        // packets arrive out of the middle of a line, then a new line begins
        for p in packets[3..].iter().chain(packets.iter()) {
            assembler.push(p);
        }
        assert_eq!(assembler.channels(), vec![(64, 2)]);
    }

    #[test]
    fn no_image_packets() {
        let mut assembler = ImageAssembler::new();
        assembler.push(&packet(70, 0, 0, 0));
        assert!(assembler.render().is_none());
    }
}
