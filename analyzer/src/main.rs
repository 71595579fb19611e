use std::io::{self, Write};
use std::path::PathBuf;

use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use humansize::{format_size, DECIMAL};
use log::LevelFilter;

use filemeta::common::{exif, icc, xmp};
use filemeta::formats::{jpeg, riff};
use filemeta::{Anomaly, FileMetadata, GenericMetadata, Metadata, Options};

fn main() {
    let matches = Command::new("filemeta analyzer")
        .version(crate_version!())
        .about("Loads and displays container and payload metadata of RIFF and JPEG files.")
        .arg_required_else_help(true)
        .arg(Arg::new("FILE")
            .help("Input file names")
            .required(true)
            .num_args(1..)
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("max-chunks")
            .long("max-chunks")
            .value_name("N")
            .help("Stop walking RIFF chunks and JPEG segments after N of them")
            .value_parser(value_parser!(usize)))
        .arg(Arg::new("no-payloads")
            .long("no-payloads")
            .help("Only walk the container structure, do not decode payloads")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Log progress to stderr; repeat for more detail")
            .action(ArgAction::Count))
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut options = Options::new().decode_payloads(!matches.get_flag("no-payloads"));
    if let Some(&n) = matches.get_one::<usize>("max-chunks") {
        options = options.max_chunks(n).max_segments(n);
    }

    let files = matches.get_many::<PathBuf>("FILE").into_iter().flatten();
    for file_name in files {
        match filemeta::extract_metadata_from_file_with_options(file_name, &options) {
            Ok(md) => print_metadata(&md),
            Err(e) => {
                let _ = writeln!(&mut io::stderr(), "Cannot load metadata from {}: {}", file_name.display(), e);
            }
        }
    }
}

fn print_notes(indent: &str, notes: &[Anomaly]) {
    for note in notes {
        println!("{}! {}", indent, note);
    }
}

fn print_metadata(md: &FileMetadata) {
    println!("{}:", md.filename.as_deref().unwrap_or("<input>"));
    println!("  Format: {} (signature {})", md.format, md.signature);
    println!("  MIME type: {}", md.mime_type());
    println!("  Size: {} ({} bytes)", format_size(md.size, DECIMAL), md.size);
    if let Some(ref extension) = md.extension {
        println!("  Extension: {}", extension);
    }
    if let Some(dimensions) = md.dimensions() {
        println!("  Dimensions: {}", dimensions);
    }
    print_notes("  ", &md.notes);

    match md.details {
        GenericMetadata::Riff(ref md) => print_riff_metadata(md),
        GenericMetadata::Jpeg(ref md) => print_jpeg_metadata(md),
        GenericMetadata::None => {}
    }

    if let Some(md) = md.exif() {
        print_exif_metadata(md);
    }
    if let Some(md) = md.icc() {
        print_icc_metadata(md);
    }
    if let Some(md) = md.xmp() {
        print_xmp_metadata(md);
    }
}

fn print_riff_metadata(md: &riff::Metadata) {
    println!("  RIFF container:");
    println!("    Form type: {}", md.form_type);
    println!("    Declared file size: {}", format_size(md.filesize as u64 + 8, DECIMAL));
    if let Some(compression) = md.compression() {
        println!("    Compression: {}", compression.name());
    }
    if md.webp.vp8x.is_some() {
        println!("    Features: {:?}", md.features());
    }
    if let Some(ref vp8l) = md.webp.vp8l {
        println!("    Alpha is used: {}", vp8l.alpha_is_used);
    }
    for note in md.webp.notes() {
        println!("    ! {}", note);
    }
    println!("    Chunks:");
    for chunk in &md.chunks {
        println!("      {} at {}, {} bytes", chunk.id, chunk.start, chunk.size);
    }
    print_notes("    ", &md.notes);
}

fn print_jpeg_metadata(md: &jpeg::Metadata) {
    println!("  JPEG image:");
    if let Some(ref frame) = md.frame {
        println!("    Sample precision: {}", frame.sample_precision);
        println!("    Components: {}", frame.components);
        println!("    Baseline: {}", frame.baseline);
        println!("    Differential: {}", frame.differential);
        println!("    Entropy coding: {:?}", frame.entropy_coding);
        println!("    Coding process: {:?}", frame.coding_process);
    }
    println!("    Segments:");
    for (offset, segment) in &md.segments {
        println!("      {:#04x} {} at {}, {} bytes: {}", segment.marker, segment.name.unwrap_or("?"),
                 offset, segment.len(), segment.description.unwrap_or("unknown marker"));
    }
    println!("    Walk ended: {:?}", md.end);
    print_notes("    ", &md.notes);
}

fn print_exif_metadata(md: &exif::Metadata) {
    println!("  EXIF:");
    if let Some(byte_order) = md.byte_order {
        println!("    Byte order: {:?}", byte_order);
    }
    if let Some(orientation) = md.orientation {
        println!("    Orientation: {}", orientation);
    }
    for ifd in &md.ifds {
        println!("    {} at {}:", ifd.kind.name(), ifd.offset);
        for entry in &ifd.entries {
            match entry.value {
                Some(ref value) => println!("      {:#06x}: {:?}", entry.tag, value),
                None => println!("      {:#06x}: type {}, {} values", entry.tag, entry.field_type.code(), entry.count)
            }
        }
    }
    print_notes("    ", &md.notes);
}

fn print_icc_metadata(md: &icc::Metadata) {
    println!("  ICC profile:");
    if let Some(ref header) = md.header {
        let (major, minor, fix) = header.version;
        println!("    Version: {}.{}.{}", major, minor, fix);
        println!("    Device class: {}", header.device_class);
        println!("    Color space: {} -> {}", header.color_space, header.connection_space);
    }
    println!("    Valid: {}, ignored: {}", md.valid, md.ignored);
    if let Some(description) = md.description() {
        println!("    Description: {}", description);
    }
    for tag in &md.tags {
        println!("      {} at {}, {} bytes", tag.signature, tag.offset, tag.length);
    }
    print_notes("    ", &md.notes);
}

fn print_xmp_metadata(md: &xmp::Metadata) {
    println!("  XMP packet ({} bytes):", md.len);
    println!("    {}", md.packet);
    print_notes("    ", &md.notes);
}
