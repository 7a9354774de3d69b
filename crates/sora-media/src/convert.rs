//! Conversions between GStreamer I420 buffers and [`I420Frame`].

use gstreamer as gst;
use gstreamer_video as gst_video;
use gstreamer_video::VideoFrameExt;
use sora_core::{monotonic_us, I420Frame};

use crate::MediaError;

/// Copy an I420 sample (any plane strides) into a packed frame stamped with
/// the capture time.
pub fn sample_to_frame(sample: &gst::Sample) -> Result<I420Frame, MediaError> {
    let caps = sample
        .caps()
        .ok_or_else(|| MediaError::Pipeline("sample without caps".into()))?;
    let info = gst_video::VideoInfo::from_caps(caps)?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| MediaError::Pipeline("sample without buffer".into()))?;
    let frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info)?;
    let strides = frame.plane_stride();

    Ok(I420Frame::copy_from_planes(
        info.width(),
        info.height(),
        frame.plane_data(0)?,
        strides[0] as usize,
        frame.plane_data(1)?,
        strides[1] as usize,
        frame.plane_data(2)?,
        strides[2] as usize,
        monotonic_us(),
    ))
}

/// Lay a packed frame out into a GStreamer buffer described by `info`.
pub fn frame_to_buffer(
    frame: &I420Frame,
    info: &gst_video::VideoInfo,
) -> Result<gst::Buffer, MediaError> {
    let buffer = gst::Buffer::with_size(info.size())?;
    let mut vframe = gst_video::VideoFrame::from_buffer_writable(buffer, info)
        .map_err(|_| MediaError::Pipeline("cannot map video buffer".into()))?;

    let rows = frame.height() as usize;
    let planes: [(&[u8], usize, usize); 3] = [
        (frame.y(), frame.stride_y(), rows),
        (frame.u(), frame.stride_uv(), rows / 2),
        (frame.v(), frame.stride_uv(), rows / 2),
    ];
    for (index, (src, src_stride, rows)) in planes.into_iter().enumerate() {
        let dst_stride = vframe.plane_stride()[index] as usize;
        let dst = vframe.plane_data_mut(index as u32)?;
        for row in 0..rows {
            let from = &src[row * src_stride..(row + 1) * src_stride];
            dst[row * dst_stride..row * dst_stride + src_stride].copy_from_slice(from);
        }
    }
    Ok(vframe.into_buffer())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_strides_survive_gstreamer_layout() {
        gst::init().unwrap();

        // 6 px wide: GStreamer pads the luma stride to 8 and chroma to 4.
        let packed: Vec<u8> = (0..36u8).collect();
        let frame = I420Frame::from_contiguous(6, 4, &packed, 0);
        let info = gst_video::VideoInfo::builder(gst_video::VideoFormat::I420, 6, 4)
            .build()
            .unwrap();
        assert!(info.stride()[0] > 6);

        let buffer = frame_to_buffer(&frame, &info).unwrap();
        let sample = gst::Sample::builder()
            .buffer(&buffer)
            .caps(&info.to_caps().unwrap())
            .build();
        let back = sample_to_frame(&sample).unwrap();

        assert_eq!((back.width(), back.height()), (6, 4));
        assert_eq!(back.data(), frame.data());
    }
}
