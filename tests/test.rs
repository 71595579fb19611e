use std::io::{self, Write};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use filemeta::common::tiff::{IfdKind, TAG_EXIF_IFD, TAG_ORIENTATION};
use filemeta::formats::jpeg::End;
use filemeta::formats::webp::{Compression, Features};
use filemeta::{Anomaly, Dimensions, Error, Format, GenericMetadata, Metadata, Options};

fn chunk(data: &mut Vec<u8>, id: &[u8; 4], payload: &[u8]) {
    data.write_all(id).unwrap();
    data.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
    data.write_all(payload).unwrap();
    if payload.len() % 2 == 1 {
        data.push(0);
    }
}

fn riff(form_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut data = b"RIFF".to_vec();
    data.write_u32::<LittleEndian>(body.len() as u32 + 4).unwrap();
    data.write_all(form_type).unwrap();
    data.write_all(body).unwrap();
    data
}

fn entry(data: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: u32) {
    data.write_u16::<LittleEndian>(tag).unwrap();
    data.write_u16::<LittleEndian>(field_type).unwrap();
    data.write_u32::<LittleEndian>(count).unwrap();
    data.write_u32::<LittleEndian>(value).unwrap();
}

/// Little-endian TIFF with orientation 6 in IFD0 and an EXIF IFD holding an ISO value.
fn tiff() -> Vec<u8> {
    let mut data = b"II*\0".to_vec();
    data.write_u32::<LittleEndian>(8).unwrap();
    // IFD0 at 8, ends at 38
    data.write_u16::<LittleEndian>(2).unwrap();
    entry(&mut data, TAG_ORIENTATION, 3, 1, 6);
    entry(&mut data, TAG_EXIF_IFD, 4, 1, 38);
    data.write_u32::<LittleEndian>(0).unwrap();
    // EXIF IFD at 38
    data.write_u16::<LittleEndian>(1).unwrap();
    entry(&mut data, 0x8827, 3, 1, 200);
    data.write_u32::<LittleEndian>(0).unwrap();
    data
}

/// Minimal RGB -> XYZ display profile with a single `desc` tag.
fn icc_profile() -> Vec<u8> {
    let mut data = Vec::new();
    data.write_u32::<BigEndian>(0).unwrap();
    data.write_all(b"lcms").unwrap();
    data.write_all(&[2, 0x10, 0, 0]).unwrap();
    data.write_all(b"mntrRGB XYZ ").unwrap();
    data.write_all(&[0; 12]).unwrap();
    data.write_all(b"acsp").unwrap();
    data.resize(128, 0);

    data.write_u32::<BigEndian>(1).unwrap();
    data.write_all(b"desc").unwrap();
    data.write_u32::<BigEndian>(144).unwrap();
    data.write_u32::<BigEndian>(20).unwrap();

    data.write_all(b"desc\0\0\0\0").unwrap();
    data.write_u32::<BigEndian>(5).unwrap();
    data.write_all(b"sRGB\0\0\0\0").unwrap();

    let len = data.len() as u32;
    (&mut data[0..4]).write_u32::<BigEndian>(len).unwrap();
    data
}

const XMP: &str = "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>";

fn extended_webp() -> Vec<u8> {
    let mut body = Vec::new();
    // EXIF, ICC and XMP flags; 400x300 canvas
    chunk(&mut body, b"VP8X", &[0x2c, 0, 0, 0, 0x8f, 0x01, 0x00, 0x2b, 0x01, 0x00]);
    chunk(&mut body, b"ICCP", &icc_profile());
    chunk(&mut body, b"VP8 ", &[0x10, 0x02, 0x00, 0x9d, 0x01, 0x2a, 0x90, 0x01, 0x2c, 0x01]);
    chunk(&mut body, b"EXIF", &tiff());
    chunk(&mut body, b"XMP ", XMP.as_bytes());
    riff(b"WEBP", &body)
}

#[test]
fn test_every_magic_number_is_detected() {
    let cases: &[(&[u8], Format)] = &[
        (b"RIFF", Format::Riff),
        (&[0xff, 0xd8, 0xff], Format::Jpeg),
        (&[0x89, 0x50, 0x4e, 0x47], Format::Png),
        (b"GIF8", Format::Gif),
        (&[0x1a, 0x45, 0xdf, 0xa3], Format::Webm),
        (&[0x00, 0x00, 0x00, 0x18], Format::Avi),
        (&[0x49, 0x44, 0x33, 0x03], Format::Mp3),
        (b"%PDF", Format::Pdf),
        (&[0xd0, 0xcf, 0x11, 0xe0], Format::Docx),
        (&[0x50, 0x4b, 0x03, 0x04], Format::Xlsx),
    ];

    for &(magic, format) in cases {
        let mut data = magic.to_vec();
        data.resize(16, 0x20);
        let md = filemeta::extract_metadata(&data).unwrap();
        assert_eq!(md.format, format, "magic {:02x?}", magic);
        assert!(!md.is_unknown());
    }
}

#[test]
fn test_zero_bytes_are_unknown() {
    let md = filemeta::extract_metadata(&[0u8; 8]).unwrap();
    assert!(md.is_unknown());
    assert_eq!(md.signature.to_hex(), "00000000");
    assert_eq!(md.details, GenericMetadata::None);
    assert!(md.notes.is_empty());
}

#[test]
fn test_extended_webp() {
    let md = filemeta::extract_metadata(&extended_webp()).unwrap();
    assert_eq!(md.format, Format::Riff);
    assert_eq!(md.mime_type(), "image/webp");
    assert_eq!(md.dimensions(), Some(Dimensions { width: 400, height: 300 }));
    assert_eq!(md.orientation(), Some(6));

    let riff = md.as_riff().unwrap();
    assert_eq!(riff.filesize as usize, md.size - 8);
    assert_eq!(riff.chunks.len(), 5);
    assert_eq!(riff.compression(), Some(Compression::Lossy));
    assert_eq!(riff.features(), Features::EXIF | Features::ICC | Features::XMP);
    assert!(riff.notes.is_empty(), "{:?}", riff.notes);

    let exif = md.exif().unwrap();
    assert!(exif.notes.is_empty(), "{:?}", exif.notes);
    let exif_ifd = exif.find(IfdKind::Exif).unwrap();
    assert_eq!(exif_ifd.get(0x8827).unwrap().value.as_ref().and_then(|v| v.first_u32()), Some(200));

    let icc = md.icc().unwrap();
    assert!(icc.valid);
    assert!(!icc.ignored);
    assert!(icc.notes.is_empty(), "{:?}", icc.notes);
    assert_eq!(icc.description().as_deref(), Some("sRGB"));

    let xmp = md.xmp().unwrap();
    assert_eq!(xmp.len, XMP.len());
    assert!(xmp.packet.starts_with("&lt;x:xmpmeta xmlns:x=&quot;"));
}

#[test]
fn test_webp_walk_only() {
    let options = Options::new().decode_payloads(false);
    let md = filemeta::extract_metadata_with_options(&extended_webp(), &options).unwrap();
    let riff = md.as_riff().unwrap();
    assert_eq!(riff.chunks.len(), 5);
    assert_eq!(md.dimensions(), None);
    assert!(md.exif().is_none() && md.icc().is_none() && md.xmp().is_none());
}

#[test]
fn test_truncated_webp_keeps_earlier_chunks() {
    let mut data = extended_webp();
    let full = data.len();
    // cut into the middle of the XMP chunk payload
    data.truncate(full - 10);

    let md = filemeta::extract_metadata(&data).unwrap();
    let riff = md.as_riff().unwrap();
    assert_eq!(riff.chunks.len(), 4);
    assert!(md.xmp().is_none());
    assert_eq!(md.orientation(), Some(6));
    match riff.notes[..] {
        [Anomaly::TruncatedContainer { offset, .. }] => assert_eq!(offset, riff.chunks[3].end()),
        ref other => panic!("unexpected notes: {:?}", other)
    }
}

#[test]
fn test_jpeg_app0_then_eoi() {
    let mut data = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];
    data.write_all(b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0").unwrap();
    data.write_all(&[0xff, 0xd9]).unwrap();

    let md = filemeta::extract_metadata(&data).unwrap();
    assert_eq!(md.format, Format::Jpeg);
    assert_eq!(md.mime_type(), "image/jpeg");

    let jpeg = md.as_jpeg().unwrap();
    assert_eq!(jpeg.end, End::EndOfImage);
    assert!(jpeg.notes.is_empty());
    assert_eq!(jpeg.segments.len(), 1);
    let app0 = &jpeg.segments[&6];
    assert_eq!(app0.name, Some("APP0"));
    assert_eq!(app0.data.len(), 14);
}

#[test]
fn test_jpeg_with_exif() {
    let mut exif = b"Exif\0\0".to_vec();
    exif.write_all(&tiff()).unwrap();

    let mut data = vec![0xff, 0xd8, 0xff, 0xe1];
    data.write_u16::<BigEndian>(exif.len() as u16 + 2).unwrap();
    data.write_all(&exif).unwrap();
    data.write_all(&[0xff, 0xc0, 0x00, 0x0b, 8, 0x00, 0x10, 0x00, 0x20, 1, 1, 0x11, 0]).unwrap();
    data.write_all(&[0xff, 0xd9]).unwrap();

    let md = filemeta::extract_metadata(&data).unwrap();
    assert_eq!(md.orientation(), Some(6));
    assert_eq!(md.dimensions(), Some(Dimensions { width: 32, height: 16 }));
    assert!(md.as_jpeg().unwrap().frame.as_ref().unwrap().baseline);
}

#[test]
fn test_ifd_pointing_at_itself_terminates() {
    let mut data = b"II*\0".to_vec();
    data.write_u32::<LittleEndian>(8).unwrap();
    data.write_u16::<LittleEndian>(2).unwrap();
    entry(&mut data, TAG_EXIF_IFD, 4, 1, 8);
    entry(&mut data, 0x0100, 13, 1, 10);
    data.write_u32::<LittleEndian>(8).unwrap();

    let mut body = Vec::new();
    chunk(&mut body, b"EXIF", &data);
    let md = filemeta::extract_metadata(&riff(b"WEBP", &body)).unwrap();

    let exif = md.exif().unwrap();
    assert_eq!(exif.ifds.len(), 1);
    // both pointers and the next-IFD loop are flagged
    assert_eq!(exif.notes.len(), 3);
    assert!(exif.notes.iter().all(|n| matches!(*n, Anomaly::InvalidOffset { .. })));
}

#[test]
fn test_extraction_is_idempotent() {
    let data = extended_webp();
    let a = filemeta::extract_metadata(&data).unwrap();
    let b = filemeta::extract_metadata(&data).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_from_reader() {
    let data = extended_webp();
    let md = filemeta::extract_metadata_from_reader(&mut io::Cursor::new(&data)).unwrap();
    assert_eq!(md, filemeta::extract_metadata(&data).unwrap());
}

#[test]
fn test_from_file() {
    let mut file = tempfile::Builder::new().suffix(".webp").tempfile().unwrap();
    file.write_all(&extended_webp()).unwrap();
    file.flush().unwrap();

    let md = filemeta::extract_metadata_from_file(file.path()).unwrap();
    assert_eq!(md.extension.as_deref(), Some("webp"));
    assert!(md.filename.as_ref().unwrap().ends_with(".webp"));
    assert_eq!(md.dimensions(), Some(Dimensions { width: 400, height: 300 }));
}

#[test]
fn test_missing_and_empty_files() {
    let dir = tempfile::tempdir().unwrap();

    match filemeta::extract_metadata_from_file(dir.path().join("missing.webp")) {
        Err(Error::NotFound(_)) => {}
        other => panic!("unexpected result: {:?}", other)
    }

    let empty = dir.path().join("empty.jpg");
    std::fs::File::create(&empty).unwrap();
    match filemeta::extract_metadata_from_file(&empty) {
        Err(Error::NotFound(_)) => {}
        other => panic!("unexpected result: {:?}", other)
    }
}
