use jvmleak::analysis::{BugAccumulator, Priority, ResourceLeakDetector, Settings};
use jvmleak::jvm::class_graph::{ClassGraph, ClassGraphArenas};
use jvmleak::jvm::model::Class;
use jvmleak::jvm::BinaryName;

use clap::{value_parser, Arg, ArgAction, Command};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use walkdir::WalkDir;

fn main() -> io::Result<()> {
    let matches = Command::new("JVM resource leak detector")
        .version("0.1.0")
        .about("Find streams, readers, writers and JDBC resources that are not closed")
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Trace open locations, escapes and exit statuses of every resource"),
        )
        .arg(
            Arg::new("allow-wrapped-uninteresting")
                .long("allow-wrapped-uninteresting")
                .action(ArgAction::SetTrue)
                .help("Report resources even when they wrap a parameter"),
        )
        .arg(
            Arg::new("base")
                .long("base")
                .value_name("CLASS_NAME")
                .action(ArgAction::Append)
                .help("Also track subtypes of this class (eg. `java.nio.channels.Channel`)"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Class files, or folders to search for class files")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    let mut settings = Settings::default();
    settings.debug = matches.get_flag("debug");
    settings.allow_wrapped_uninteresting = matches.get_flag("allow-wrapped-uninteresting");

    let mut logger = env_logger::Builder::from_default_env();
    if settings.debug {
        logger.filter_module("jvmleak", log::LevelFilter::Debug);
    }
    logger.init();

    if let Some(bases) = matches.get_many::<String>("base") {
        for base in bases {
            match BinaryName::from_dotted(base) {
                Ok(base) => settings.add_resource_base(base),
                Err(err) => {
                    log::error!("Ignoring base '{}': {:?}", base, err);
                }
            }
        }
    }

    // Find all of the class files
    let mut class_files: Vec<PathBuf> = vec![];
    for input in matches.get_many::<PathBuf>("INPUT").into_iter().flatten() {
        if input.is_file() {
            class_files.push(input.clone());
        } else {
            class_files.extend(
                WalkDir::new(input)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .map(|e| e.into_path())
                    .filter(|e| e.is_file() && e.extension().map_or(false, |ex| ex == "class")),
            );
        }
    }

    // Read every class up front so the hierarchy is complete before analysis starts
    let mut classes: Vec<Class> = vec![];
    let mut count_unreadable = 0;
    for class_file in &class_files {
        log::info!("Reading '{}'", class_file.display());
        match Class::from_path(class_file) {
            Ok(class) => classes.push(class),
            Err(err) => {
                count_unreadable += 1;
                log::error!("Failed to read '{}': {:?}", class_file.display(), err);
            }
        }
    }

    let class_graph_arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&class_graph_arenas);
    class_graph.insert_java_library_types();
    class_graph.add_model_classes(&classes);

    let detector = ResourceLeakDetector::new(&settings, &class_graph);
    let mut bugs = BugAccumulator::new();
    for class in &classes {
        log::debug!("Analyzing {}", class.name);
        detector.visit_class(class, &mut bugs);
    }

    for missing in bugs.missing_classes() {
        log::warn!("Class {} was not available to the analysis", missing);
    }

    // Print out the findings
    let stdout = StandardStream::stdout(ColorChoice::Auto);
    let found = bugs.bugs();
    for bug in &found {
        let color = match bug.instance.priority {
            Priority::Normal => Color::Red,
            Priority::Low => Color::Yellow,
        };
        let mut s = stdout.lock();
        s.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(s, "{}", bug.instance.priority)?;
        s.reset()?;
        write!(s, " {} ", bug.instance.bug_type)?;
        s.set_color(ColorSpec::new().set_bold(true))?;
        write!(
            s,
            "{}.{}{}",
            bug.instance.class_name, bug.instance.method_name, bug.instance.method_descriptor
        )?;
        s.reset()?;
        write!(s, " leaks ")?;
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(s, "{}", bug.instance.declared_type)?;
        s.reset()?;
        for (idx, line) in bug.lines.iter().enumerate() {
            write!(s, "{}{}", if idx == 0 { " at " } else { ", " }, line)?;
        }
        writeln!(s)?;
    }

    log::info!(
        "{} classes analyzed, {} unreadable, {} findings",
        classes.len(),
        count_unreadable,
        found.len()
    );

    // Exit code
    exit(if found.is_empty() { 0 } else { 1 })
}
