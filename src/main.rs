//! invoice-forge – command-line invoice exporter.
//!
//! Usage:
//!   invoice-forge <invoice.json> [output] [--format pdf|png] [--locale es] ...
//!   invoice-forge --sample [output] ...
//!
//! If `output` is omitted the file is written to the working directory as
//! `invoice.pdf` or `invoice.png`.

use std::{env, fs, path::PathBuf, process, sync::Arc};

use invoice_forge::fonts::FontManager;
use invoice_forge::i18n::{Catalog, Translator, DEFAULT_LOCALE};
use invoice_forge::invoice::InvoiceRecord;
use invoice_forge::pipeline::{ExportConfig, InvoiceExporter};
use invoice_forge::{ExportMode, PageImageStrategy, TrailingPage};

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    process::exit(1);
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> String {
    match iter.next() {
        Some(v) => v.clone(),
        None => fail(format!("{flag} requires a value")),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut sample = false;
    let mut mode = ExportMode::Document;
    let mut locale = DEFAULT_LOCALE.to_string();
    let mut catalog_path: Option<PathBuf> = None;
    let mut font_path: Option<PathBuf> = None;
    let mut config = ExportConfig::default();
    let mut positionals: Vec<PathBuf> = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" | "-f" => {
                let v = flag_value(&mut iter, arg);
                mode = v.parse().unwrap_or_else(|e| fail(e));
            }
            "--locale" | "-l" => locale = flag_value(&mut iter, arg),
            "--catalog" => catalog_path = Some(PathBuf::from(flag_value(&mut iter, arg))),
            "--scale" | "-s" => {
                let v = flag_value(&mut iter, arg);
                config.scale = v
                    .parse()
                    .unwrap_or_else(|_| fail(format!("invalid scale `{v}`")));
            }
            "--font" => font_path = Some(PathBuf::from(flag_value(&mut iter, arg))),
            "--logo" => config.logo_src = Some(flag_value(&mut iter, arg)),
            "--title" | "-t" => config.title = flag_value(&mut iter, arg),
            "--allow-cross-origin" => config.allow_cross_origin = true,
            "--resource" => {
                let v = flag_value(&mut iter, arg);
                let Some((url, file)) = v.split_once('=') else {
                    fail(format!("--resource expects URL=FILE, got `{v}`"));
                };
                let bytes = fs::read(file).unwrap_or_else(|e| fail(format!("reading '{file}': {e}")));
                config.resources.insert(url, bytes);
            }
            "--omit-trailing-page" => config.trailing_page = TrailingPage::Omit,
            "--slice-bands" => config.strategy = PageImageStrategy::SliceBands,
            "--sample" => sample = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => positionals.push(PathBuf::from(path)),
        }
    }

    // With --sample the only positional argument is the output.
    let max_positionals = if sample { 1 } else { 2 };
    if positionals.len() > max_positionals {
        eprintln!("Unexpected argument: {}", positionals[max_positionals].display());
        print_usage(&args[0]);
        process::exit(1);
    }
    let mut positionals = positionals.into_iter();
    let input_path = if sample { None } else { positionals.next() };
    let output_path = positionals.next();

    let invoice = match (&input_path, sample) {
        (_, true) => InvoiceRecord::sample(),
        (Some(path), false) => {
            let json = fs::read_to_string(path)
                .unwrap_or_else(|e| fail(format!("reading '{}': {e}", path.display())));
            // Relative logo paths resolve next to the invoice file.
            config.base_dir = path.parent().map(PathBuf::from);
            InvoiceRecord::from_json(&json)
                .unwrap_or_else(|e| fail(format!("parsing '{}': {e}", path.display())))
        }
        (None, false) => {
            eprintln!("Error: no input file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    let catalog = match catalog_path {
        Some(path) => {
            let json = fs::read_to_string(&path)
                .unwrap_or_else(|e| fail(format!("reading '{}': {e}", path.display())));
            Catalog::from_json(&json).unwrap_or_else(|e| fail(format!("parsing '{}': {e}", path.display())))
        }
        None => Catalog::builtin(),
    };
    let translator = Translator::new(Arc::new(catalog), locale);

    let mut fonts = FontManager::new();
    if let Some(path) = font_path {
        let bytes = fs::read(&path).unwrap_or_else(|e| fail(format!("reading '{}': {e}", path.display())));
        let family = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Custom")
            .to_string();
        if let Err(e) = fonts.load_font(&family, false, false, bytes) {
            fail(format!("loading '{}': {e}", path.display()));
        }
    }

    let exporter = InvoiceExporter::new(config).with_fonts(fonts);
    let output = match exporter.export_invoice(&invoice, &translator, mode) {
        Ok(o) => o,
        Err(e) => fail(format!("export failed: {e}")),
    };
    let target = output_path.unwrap_or_else(|| PathBuf::from(output.file_name()));

    if let Err(e) = output.save(&target) {
        fail(e);
    }
    eprintln!(
        "Wrote '{}' ({} bytes, {}x{} px, {} page{})",
        target.display(),
        output.bytes.len(),
        output.width_px,
        output.height_px,
        output.page_count,
        if output.page_count == 1 { "" } else { "s" }
    );
}

fn print_usage(prog: &str) {
    eprintln!("invoice-forge – invoice to PDF/PNG exporter");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <invoice.json> [output] [flags]");
    eprintln!("  {prog} --sample [output] [flags]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <invoice.json>        Invoice record (camelCase JSON)");
    eprintln!("  [output]              Output path (default: invoice.pdf / invoice.png)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --format, -f FMT      pdf (default) or png");
    eprintln!("  --locale, -l CODE     Label language: en (default), es, or one from --catalog");
    eprintln!("  --catalog FILE        JSON catalog {{\"<locale>\": {{\"<English label>\": \"...\"}}}}");
    eprintln!("  --scale, -s N         Device pixels per CSS px (default: 2)");
    eprintln!("  --font FILE           TTF/OTF face used for all text (default: greeked metrics)");
    eprintln!("  --logo SRC            Header logo: data URI or path relative to the invoice");
    eprintln!("  --title, -t TEXT      PDF document title (default: Invoice)");
    eprintln!("  --allow-cross-origin  Permit http(s) image sources supplied with --resource");
    eprintln!("  --resource URL=FILE   Pre-fetched bytes for a cross-origin image source");
    eprintln!("  --omit-trailing-page  Skip the empty page after content ending on a page boundary");
    eprintln!("  --slice-bands         Embed one cropped image per page instead of one shifted image");
    eprintln!("  --sample              Export a built-in sample invoice");
    eprintln!("  --help                Print this message");
}
