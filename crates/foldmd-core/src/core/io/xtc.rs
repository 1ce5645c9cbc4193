use std::io::{self, Write};
use thiserror::Error;

const XTC_MAGIC: i32 = 1995;
const FIRSTIDX: usize = 9;
const MAX_ABS: f32 = (i32::MAX - 2) as f32;

#[rustfmt::skip]
const MAGICINTS: [i32; 73] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 8, 10, 12, 16, 20, 25, 32, 40, 50, 64,
    80, 101, 128, 161, 203, 256, 322, 406, 512, 645, 812, 1024, 1290,
    1625, 2048, 2580, 3250, 4096, 5060, 6501, 8192, 10321, 13003,
    16384, 20642, 26007, 32768, 41285, 52015, 65536, 82570, 104031,
    131072, 165140, 208063, 262144, 330280, 416127, 524287, 660561,
    832255, 1048576, 1321122, 1664510, 2097152, 2642245, 3329021,
    4194304, 5284491, 6658042, 8388607, 10568983, 13316085, 16777216,
];
const LASTIDX: usize = MAGICINTS.len();

#[derive(Debug, Error)]
pub enum XtcError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Coordinate {value} cannot be represented at precision {precision}")]
    CoordinateOverflow { value: f32, precision: f32 },
}

/// One trajectory frame in XTC units (nanometers, picoseconds).
#[derive(Debug, Clone)]
pub struct XtcFrame<'a> {
    pub step: i32,
    pub time: f32,
    /// Box vectors as rows, in nm.
    pub box_vectors: [[f32; 3]; 3],
    pub coords: &'a [[f32; 3]],
}

/// Streams frames in the compressed GROMACS XTC format.
///
/// Every value is big-endian XDR. Frames with more than nine atoms use the
/// run-length integer compression of `xdr3dfcoord`; smaller frames store raw floats.
pub struct XtcWriter<W: Write> {
    inner: W,
    precision: f32,
}

impl<W: Write> XtcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_precision(inner, 1000.0)
    }

    pub fn with_precision(inner: W, precision: f32) -> Self {
        Self { inner, precision }
    }

    pub fn write_frame(&mut self, frame: &XtcFrame<'_>) -> Result<(), XtcError> {
        let natoms = frame.coords.len() as i32;
        let mut out = Vec::with_capacity(64 + frame.coords.len() * 6);
        put_i32(&mut out, XTC_MAGIC);
        put_i32(&mut out, natoms);
        put_i32(&mut out, frame.step);
        put_f32(&mut out, frame.time);
        for row in &frame.box_vectors {
            for &v in row {
                put_f32(&mut out, v);
            }
        }
        compress_coords(&mut out, frame.coords, self.precision)?;
        self.inner.write_all(&out)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), XtcError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Number of bits needed to store values in `0..size`.
fn sizeofint(size: i32) -> u32 {
    let mut num: u64 = 1;
    let mut bits = 0;
    while size as i64 >= num as i64 && bits < 32 {
        bits += 1;
        num <<= 1;
    }
    bits
}

/// Number of bits needed for the mixed-radix product of `sizes`.
fn sizeofints(sizes: &[u32; 3]) -> u32 {
    let mut bytes = [0u32; 32];
    bytes[0] = 1;
    let mut num_of_bytes = 1;
    for &size in sizes {
        let mut tmp: u32 = 0;
        let mut cnt = 0;
        while cnt < num_of_bytes {
            tmp = bytes[cnt] * size + tmp;
            bytes[cnt] = tmp & 0xff;
            tmp >>= 8;
            cnt += 1;
        }
        while tmp != 0 {
            bytes[cnt] = tmp & 0xff;
            cnt += 1;
            tmp >>= 8;
        }
        num_of_bytes = cnt;
    }
    let mut num = 1;
    let mut bits = 0;
    num_of_bytes -= 1;
    while bytes[num_of_bytes] >= num {
        bits += 1;
        num *= 2;
    }
    bits + num_of_bytes as u32 * 8
}

#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    lastbits: u32,
    lastbyte: u32,
}

impl BitWriter {
    fn send_bits(&mut self, mut num_of_bits: u32, num: u32) {
        while num_of_bits >= 8 {
            let chunk = num.checked_shr(num_of_bits - 8).unwrap_or(0);
            self.lastbyte = (self.lastbyte << 8) | chunk;
            self.bytes.push((self.lastbyte >> self.lastbits) as u8);
            num_of_bits -= 8;
        }
        if num_of_bits > 0 {
            self.lastbyte = (self.lastbyte << num_of_bits) | num;
            self.lastbits += num_of_bits;
            if self.lastbits >= 8 {
                self.lastbits -= 8;
                self.bytes.push((self.lastbyte >> self.lastbits) as u8);
            }
        }
    }

    /// Packs three integers as one mixed-radix number in `num_of_bits` bits.
    fn send_ints(&mut self, num_of_bits: u32, sizes: &[u32; 3], nums: &[u32]) {
        let mut bytes = [0u32; 32];
        let mut num_of_bytes = 0;
        let mut tmp = nums[0];
        loop {
            bytes[num_of_bytes] = tmp & 0xff;
            num_of_bytes += 1;
            tmp >>= 8;
            if tmp == 0 {
                break;
            }
        }
        for i in 1..3 {
            let mut tmp = nums[i];
            let mut cnt = 0;
            while cnt < num_of_bytes {
                tmp = bytes[cnt] * sizes[i] + tmp;
                bytes[cnt] = tmp & 0xff;
                tmp >>= 8;
                cnt += 1;
            }
            while tmp != 0 {
                bytes[cnt] = tmp & 0xff;
                cnt += 1;
                tmp >>= 8;
            }
            num_of_bytes = cnt;
        }
        let whole = num_of_bytes as u32 * 8;
        if num_of_bits >= whole {
            for &b in &bytes[..num_of_bytes] {
                self.send_bits(8, b);
            }
            self.send_bits(num_of_bits - whole, 0);
        } else {
            for &b in &bytes[..num_of_bytes - 1] {
                self.send_bits(8, b);
            }
            self.send_bits(num_of_bits - (whole - 8), bytes[num_of_bytes - 1]);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.lastbits > 0 {
            self.bytes
                .push((self.lastbyte << (8 - self.lastbits)) as u8);
        }
        self.bytes
    }
}

fn compress_coords(
    out: &mut Vec<u8>,
    coords: &[[f32; 3]],
    precision: f32,
) -> Result<(), XtcError> {
    let size = coords.len();
    put_i32(out, size as i32);
    if size <= 9 {
        for c in coords {
            for &v in c {
                put_f32(out, v);
            }
        }
        return Ok(());
    }
    put_f32(out, precision);

    let mut ints: Vec<i32> = Vec::with_capacity(size * 3);
    let mut minint = [i32::MAX; 3];
    let mut maxint = [i32::MIN; 3];
    let mut mindiff = i32::MAX;
    let mut old = [0i32; 3];
    for (i, c) in coords.iter().enumerate() {
        let mut lint = [0i32; 3];
        for k in 0..3 {
            let lf = if c[k] >= 0.0 {
                c[k] * precision + 0.5
            } else {
                c[k] * precision - 0.5
            };
            if lf.abs() > MAX_ABS {
                return Err(XtcError::CoordinateOverflow {
                    value: c[k],
                    precision,
                });
            }
            lint[k] = lf as i32;
            minint[k] = minint[k].min(lint[k]);
            maxint[k] = maxint[k].max(lint[k]);
            ints.push(lint[k]);
        }
        let diff = (old[0] - lint[0]).abs() + (old[1] - lint[1]).abs() + (old[2] - lint[2]).abs();
        if i > 0 && diff < mindiff {
            mindiff = diff;
        }
        old = lint;
    }
    for v in minint.iter().chain(maxint.iter()) {
        put_i32(out, *v);
    }

    let mut sizeint = [0u32; 3];
    for k in 0..3 {
        let span = maxint[k] as i64 - minint[k] as i64 + 1;
        if span as f32 >= MAX_ABS {
            return Err(XtcError::CoordinateOverflow {
                value: maxint[k] as f32 / precision,
                precision,
            });
        }
        sizeint[k] = span as u32;
    }
    let mut bitsizeint = [0u32; 3];
    let bitsize = if (sizeint[0] | sizeint[1] | sizeint[2]) > 0xff_ffff {
        for k in 0..3 {
            bitsizeint[k] = sizeofint(sizeint[k] as i32);
        }
        0
    } else {
        sizeofints(&sizeint)
    };

    let mut smallidx = FIRSTIDX;
    while smallidx < LASTIDX - 1 && MAGICINTS[smallidx] < mindiff {
        smallidx += 1;
    }
    put_i32(out, smallidx as i32);

    let maxidx = (smallidx + 8).min(LASTIDX);
    let minidx = maxidx - 8;
    let mut smaller = MAGICINTS[FIRSTIDX.max(smallidx - 1)] / 2;
    let mut smallnum = MAGICINTS[smallidx] / 2;
    let mut sizesmall = [MAGICINTS[smallidx] as u32; 3];
    let larger = MAGICINTS[maxidx.min(LASTIDX - 1)] / 2;

    let mut bits = BitWriter::default();
    let mut prevcoord = [0i32; 3];
    let mut prevrun: i32 = -1;
    let mut tmpcoord = [0u32; 24];
    let mut i = 0;

    while i < size {
        let base = i * 3;
        let mut is_small = false;
        let mut is_smaller: i32 = if smallidx < maxidx
            && i >= 1
            && (0..3).all(|k| (ints[base + k] - prevcoord[k]).abs() < larger)
        {
            1
        } else if smallidx > minidx {
            -1
        } else {
            0
        };

        if i + 1 < size && (0..3).all(|k| (ints[base + k] - ints[base + 3 + k]).abs() < smallnum) {
            // Swap the first two atoms of a close pair (water O and H).
            for k in 0..3 {
                ints.swap(base + k, base + 3 + k);
            }
            is_small = true;
        }

        for k in 0..3 {
            tmpcoord[k] = (ints[base + k] - minint[k]) as u32;
        }
        if bitsize == 0 {
            for k in 0..3 {
                bits.send_bits(bitsizeint[k], tmpcoord[k]);
            }
        } else {
            let first = [tmpcoord[0], tmpcoord[1], tmpcoord[2]];
            bits.send_ints(bitsize, &sizeint, &first);
        }
        prevcoord.copy_from_slice(&ints[base..base + 3]);
        i += 1;

        let mut run: usize = 0;
        if !is_small && is_smaller == -1 {
            is_smaller = 0;
        }
        while is_small && run < 24 {
            let cur = i * 3;
            if is_smaller == -1 {
                let d2: i64 = (0..3)
                    .map(|k| {
                        let d = (ints[cur + k] - prevcoord[k]) as i64;
                        d * d
                    })
                    .sum();
                if d2 >= smaller as i64 * smaller as i64 {
                    is_smaller = 0;
                }
            }
            for k in 0..3 {
                tmpcoord[run] = (ints[cur + k] - prevcoord[k] + smallnum) as u32;
                run += 1;
            }
            prevcoord.copy_from_slice(&ints[cur..cur + 3]);
            i += 1;
            let next = i * 3;
            is_small = i < size
                && (0..3).all(|k| (ints[next + k] - prevcoord[k]).abs() < smallnum);
        }

        if run as i32 != prevrun || is_smaller != 0 {
            prevrun = run as i32;
            bits.send_bits(1, 1);
            bits.send_bits(5, (run as i32 + is_smaller + 1) as u32);
        } else {
            bits.send_bits(1, 0);
        }
        for k in (0..run).step_by(3) {
            bits.send_ints(smallidx as u32, &sizesmall, &tmpcoord[k..k + 3]);
        }
        if is_smaller != 0 {
            smallidx = (smallidx as i32 + is_smaller) as usize;
            if is_smaller < 0 {
                smallnum = smaller;
                smaller = if smallidx > FIRSTIDX {
                    MAGICINTS[smallidx - 1] / 2
                } else {
                    0
                };
            } else {
                smaller = smallnum;
                smallnum = MAGICINTS[smallidx] / 2;
            }
            sizesmall = [MAGICINTS[smallidx] as u32; 3];
        }
    }

    let payload = bits.finish();
    put_i32(out, payload.len() as i32);
    out.extend_from_slice(&payload);
    let pad = (4 - payload.len() % 4) % 4;
    out.extend(std::iter::repeat_n(0u8, pad));
    Ok(())
}
