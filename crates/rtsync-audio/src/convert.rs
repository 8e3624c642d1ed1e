//! Buffer massaging between the fill routine and the hardware

/// Reverse the byte order of every sample in `buf`
///
/// Works for any width: for 24-bit samples this swaps bytes 0 and 2.
pub fn swap_sample_bytes(buf: &mut [u8], bytes_per_sample: usize) {
    if bytes_per_sample < 2 {
        return;
    }
    for sample in buf.chunks_exact_mut(bytes_per_sample) {
        sample.reverse();
    }
}

/// Split `frames` interleaved frames into one buffer per channel
///
/// `planes.len()` is the channel count. Each plane must hold at least
/// `frames * bytes_per_sample` bytes.
pub fn deinterleave<P: AsMut<[u8]>>(
    interleaved: &[u8],
    planes: &mut [P],
    frames: usize,
    bytes_per_sample: usize,
) {
    let channels = planes.len();
    let frame_bytes = channels * bytes_per_sample;

    for (ch, plane) in planes.iter_mut().enumerate() {
        let plane = plane.as_mut();
        let offset = ch * bytes_per_sample;
        for (dst, frame) in plane
            .chunks_exact_mut(bytes_per_sample)
            .zip(interleaved.chunks_exact(frame_bytes))
            .take(frames)
        {
            dst.copy_from_slice(&frame[offset..offset + bytes_per_sample]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_16_and_24_bit() {
        let mut buf = [0x01, 0x02, 0x03, 0x04];
        swap_sample_bytes(&mut buf, 2);
        assert_eq!(buf, [0x02, 0x01, 0x04, 0x03]);

        let mut buf = [0x0a, 0x0b, 0x0c, 0x1a, 0x1b, 0x1c];
        swap_sample_bytes(&mut buf, 3);
        assert_eq!(buf, [0x0c, 0x0b, 0x0a, 0x1c, 0x1b, 0x1a]);
    }

    #[test]
    fn test_swap_8_bit_is_noop() {
        let mut buf = [1, 2, 3];
        swap_sample_bytes(&mut buf, 1);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_deinterleave_stereo_16() {
        // L0 R0 L1 R1 as 16-bit samples
        let interleaved = [0x10, 0x11, 0x20, 0x21, 0x12, 0x13, 0x22, 0x23];
        let mut planes = vec![vec![0u8; 4], vec![0u8; 4]];
        deinterleave(&interleaved, &mut planes, 2, 2);
        assert_eq!(planes[0], [0x10, 0x11, 0x12, 0x13]);
        assert_eq!(planes[1], [0x20, 0x21, 0x22, 0x23]);
    }

    #[test]
    fn test_deinterleave_leaves_tail_untouched() {
        let interleaved = [1, 2, 3, 4];
        let mut planes = vec![vec![9u8; 3], vec![9u8; 3]];
        deinterleave(&interleaved, &mut planes, 2, 1);
        assert_eq!(planes[0], [1, 3, 9]);
        assert_eq!(planes[1], [2, 4, 9]);
    }
}
