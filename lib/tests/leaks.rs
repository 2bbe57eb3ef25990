use jvmleak::analysis::bugs::{RESOURCE_LEAK, RESOURCE_LEAK_EXCEPTION_PATH};
use jvmleak::analysis::{Bug, BugAccumulator, Priority, ResourceLeakDetector, Settings};
use jvmleak::jvm::class_file::MethodRef;
use jvmleak::jvm::class_graph::{ClassGraph, ClassGraphArenas};
use jvmleak::jvm::code::{BranchInstruction, CodeBuilder, EqComparison, Instruction, InvokeType};
use jvmleak::jvm::model::{Class, Method};
use jvmleak::jvm::{
    BinaryName, ClassAccessFlags, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor,
    RefType, UnqualifiedName,
};

fn invoke(invoke_type: InvokeType, class: BinaryName, name: &str, descriptor: &str) -> Instruction {
    Instruction::Invoke(
        invoke_type,
        MethodRef {
            class: RefType::Object(class),
            name: UnqualifiedName::from_string(name.to_owned()).unwrap(),
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
            is_interface: false,
        },
    )
}

/// `new <class>(<local 0>)`, leaving the instance on the stack
fn construct(builder: &mut CodeBuilder, class: BinaryName, descriptor: &str) {
    builder.push_instruction(Instruction::New(class.clone()));
    builder.push_instruction(Instruction::Dup);
    builder.push_instruction(Instruction::ALoad(0));
    builder.push_instruction(invoke(InvokeType::Special, class, "<init>", descriptor));
}

fn call(builder: &mut CodeBuilder, local: u16, class: BinaryName, name: &str, descriptor: &str) {
    builder.push_instruction(Instruction::ALoad(local));
    builder.push_instruction(invoke(InvokeType::Virtual, class, name, descriptor));
}

fn static_method(name: &str, descriptor: &str, builder: CodeBuilder) -> Method {
    Method::new(
        UnqualifiedName::from_string(name.to_owned()).unwrap(),
        MethodDescriptor::parse(descriptor).unwrap(),
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
    )
    .with_code(builder.build().unwrap())
}

fn analyze_class(settings: &Settings, methods: Vec<Method>) -> Vec<Bug> {
    let mut class = Class::new(
        BinaryName::from_dotted("app.Files").unwrap(),
        Some(BinaryName::OBJECT),
        ClassAccessFlags::PUBLIC,
    );
    class.source_file = Some(String::from("Files.java"));
    for method in methods {
        class.add_method(method);
    }

    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    class_graph.insert_java_library_types();
    class_graph.add_model_class(&class);

    let detector = ResourceLeakDetector::new(settings, &class_graph);
    let mut bugs = BugAccumulator::new();
    detector.visit_class(&class, &mut bugs);
    bugs.bugs()
}

fn analyze_with(settings: &Settings, method: Method) -> Vec<Bug> {
    analyze_class(settings, vec![method])
}

fn analyze(method: Method) -> Vec<Bug> {
    analyze_with(&Settings::default(), method)
}

#[test]
fn direct_leak() {
    // static void read(String path) { FileInputStream in = new FileInputStream(path); in.read(); }
    let mut builder = CodeBuilder::new();
    builder.mark_line(10);
    construct(&mut builder, BinaryName::FILEINPUTSTREAM, "(Ljava/lang/String;)V");
    builder.push_instruction(Instruction::AStore(1));
    builder.mark_line(11);
    call(&mut builder, 1, BinaryName::FILEINPUTSTREAM, "read", "()I");
    builder.push_instruction(Instruction::Pop);
    builder.mark_line(12);
    builder.push_branch(BranchInstruction::Return);

    let bugs = analyze(static_method("read", "(Ljava/lang/String;)V", builder));
    assert_eq!(bugs.len(), 1);
    let bug = &bugs[0];
    assert_eq!(bug.instance.bug_type, RESOURCE_LEAK);
    assert_eq!(bug.instance.priority, Priority::Normal);
    assert_eq!(bug.instance.method_name, "read");
    assert_eq!(bug.instance.leaked_type, BinaryName::INPUTSTREAM);
    assert_eq!(bug.instance.declared_type, BinaryName::FILEINPUTSTREAM);
    assert_eq!(bug.lines.len(), 1);
    assert_eq!(bug.lines[0].line, Some(10));
    assert_eq!(bug.lines[0].to_string(), "Files.java:10");
}

#[test]
fn closed_in_finally() {
    // FileInputStream in = new FileInputStream(path);
    // try { in.read(); } finally { in.close(); }
    let mut builder = CodeBuilder::new();
    let handler = builder.fresh_label();
    construct(&mut builder, BinaryName::FILEINPUTSTREAM, "(Ljava/lang/String;)V");
    builder.push_instruction(Instruction::AStore(1));
    let start = builder.here();
    call(&mut builder, 1, BinaryName::FILEINPUTSTREAM, "read", "()I");
    builder.push_instruction(Instruction::Pop);
    let end = builder.here();
    call(&mut builder, 1, BinaryName::FILEINPUTSTREAM, "close", "()V");
    builder.push_branch(BranchInstruction::Return);
    builder.place_label(handler).unwrap();
    builder.push_instruction(Instruction::AStore(2));
    call(&mut builder, 1, BinaryName::FILEINPUTSTREAM, "close", "()V");
    builder.push_instruction(Instruction::ALoad(2));
    builder.push_branch(BranchInstruction::AThrow);
    builder.add_exception_handler(start, end, handler, None);

    let bugs = analyze(static_method("read", "(Ljava/lang/String;)V", builder));
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);
}

#[test]
fn closing_the_outer_wrapper() {
    // BufferedReader reader = new BufferedReader(new FileReader(path));
    // try { reader.readLine(); } finally { reader.close(); }
    let mut builder = CodeBuilder::new();
    let handler = builder.fresh_label();
    builder.push_instruction(Instruction::New(BinaryName::BUFFEREDREADER));
    builder.push_instruction(Instruction::Dup);
    construct(&mut builder, BinaryName::FILEREADER, "(Ljava/lang/String;)V");
    builder.push_instruction(invoke(
        InvokeType::Special,
        BinaryName::BUFFEREDREADER,
        "<init>",
        "(Ljava/io/Reader;)V",
    ));
    builder.push_instruction(Instruction::AStore(1));
    let start = builder.here();
    call(
        &mut builder,
        1,
        BinaryName::BUFFEREDREADER,
        "readLine",
        "()Ljava/lang/String;",
    );
    builder.push_instruction(Instruction::Pop);
    let end = builder.here();
    call(&mut builder, 1, BinaryName::BUFFEREDREADER, "close", "()V");
    builder.push_branch(BranchInstruction::Return);
    builder.place_label(handler).unwrap();
    builder.push_instruction(Instruction::AStore(2));
    call(&mut builder, 1, BinaryName::BUFFEREDREADER, "close", "()V");
    builder.push_instruction(Instruction::ALoad(2));
    builder.push_branch(BranchInstruction::AThrow);
    builder.add_exception_handler(start, end, handler, None);

    let bugs = analyze(static_method("firstLine", "(Ljava/lang/String;)V", builder));
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);
}

#[test]
fn closing_a_wrapper_closes_the_stream() {
    // InputStream a = new FileInputStream(path);
    // InputStream b = new BufferedInputStream(a);
    // b.close();
    let mut builder = CodeBuilder::new();
    construct(&mut builder, BinaryName::FILEINPUTSTREAM, "(Ljava/lang/String;)V");
    builder.push_instruction(Instruction::AStore(1));
    builder.push_instruction(Instruction::New(BinaryName::BUFFEREDINPUTSTREAM));
    builder.push_instruction(Instruction::Dup);
    builder.push_instruction(Instruction::ALoad(1));
    builder.push_instruction(invoke(
        InvokeType::Special,
        BinaryName::BUFFEREDINPUTSTREAM,
        "<init>",
        "(Ljava/io/InputStream;)V",
    ));
    builder.push_instruction(Instruction::AStore(2));
    call(&mut builder, 2, BinaryName::INPUTSTREAM, "close", "()V");
    builder.push_branch(BranchInstruction::Return);

    let bugs = analyze(static_method("buffered", "(Ljava/lang/String;)V", builder));
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);
}

fn wrap_parameter() -> Method {
    // static void wrap(InputStream in) { new DataInputStream(in).readInt(); }
    let mut builder = CodeBuilder::new();
    builder.mark_line(20);
    construct(&mut builder, BinaryName::DATAINPUTSTREAM, "(Ljava/io/InputStream;)V");
    builder.push_instruction(Instruction::AStore(1));
    call(&mut builder, 1, BinaryName::DATAINPUTSTREAM, "readInt", "()I");
    builder.push_instruction(Instruction::Pop);
    builder.push_branch(BranchInstruction::Return);
    static_method("wrap", "(Ljava/io/InputStream;)V", builder)
}

#[test]
fn wrapped_parameters_are_not_reported() {
    let bugs = analyze(wrap_parameter());
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);

    let settings = Settings {
        allow_wrapped_uninteresting: true,
        ..Settings::default()
    };
    let bugs = analyze_with(&settings, wrap_parameter());
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].instance.priority, Priority::Normal);
    assert_eq!(bugs[0].instance.declared_type, BinaryName::DATAINPUTSTREAM);
    assert_eq!(bugs[0].lines[0].line, Some(20));
}

#[test]
fn wrappers_of_wrapped_parameters_are_not_reported() {
    // static void wrap(InputStream in) { new DataInputStream(new BufferedInputStream(in)).readInt(); }
    let mut builder = CodeBuilder::new();
    builder.push_instruction(Instruction::New(BinaryName::DATAINPUTSTREAM));
    builder.push_instruction(Instruction::Dup);
    construct(&mut builder, BinaryName::BUFFEREDINPUTSTREAM, "(Ljava/io/InputStream;)V");
    builder.push_instruction(invoke(
        InvokeType::Special,
        BinaryName::DATAINPUTSTREAM,
        "<init>",
        "(Ljava/io/InputStream;)V",
    ));
    builder.push_instruction(Instruction::AStore(1));
    call(&mut builder, 1, BinaryName::DATAINPUTSTREAM, "readInt", "()I");
    builder.push_instruction(Instruction::Pop);
    builder.push_branch(BranchInstruction::Return);
    let method = static_method("wrapTwice", "(Ljava/io/InputStream;)V", builder);

    // The outer stream never sees the parameter directly
    let bugs = analyze(method);
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);
}

#[test]
fn leak_on_exception_path() {
    // FileInputStream in = new FileInputStream(path); in.read(); in.close();
    let mut builder = CodeBuilder::new();
    builder.mark_line(30);
    construct(&mut builder, BinaryName::FILEINPUTSTREAM, "(Ljava/lang/String;)V");
    builder.push_instruction(Instruction::AStore(1));
    builder.mark_line(31);
    call(&mut builder, 1, BinaryName::FILEINPUTSTREAM, "read", "()I");
    builder.push_instruction(Instruction::Pop);
    builder.mark_line(32);
    call(&mut builder, 1, BinaryName::FILEINPUTSTREAM, "close", "()V");
    builder.push_branch(BranchInstruction::Return);

    let bugs = analyze(static_method("read", "(Ljava/lang/String;)V", builder));
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].instance.bug_type, RESOURCE_LEAK_EXCEPTION_PATH);
    assert_eq!(bugs[0].instance.priority, Priority::Low);
    assert_eq!(bugs[0].lines[0].line, Some(30));
    assert!(bugs[0].to_string().starts_with("LOW RESOURCE_LEAK_EXCEPTION_PATH app.Files.read"));
}

/// `public static void main(String[] args) { new <class>(args[0]) ... }`
fn main_opening(class: BinaryName) -> Method {
    let mut builder = CodeBuilder::new();
    builder.push_instruction(Instruction::New(class.clone()));
    builder.push_instruction(Instruction::Dup);
    builder.push_instruction(Instruction::ALoad(0));
    builder.push_instruction(Instruction::IConst0);
    builder.push_instruction(Instruction::AALoad);
    builder.push_instruction(invoke(
        InvokeType::Special,
        class,
        "<init>",
        "(Ljava/lang/String;)V",
    ));
    builder.push_instruction(Instruction::AStore(1));
    builder.push_branch(BranchInstruction::Return);
    static_method("main", "([Ljava/lang/String;)V", builder)
}

#[test]
fn main_may_leave_input_open() {
    let bugs = analyze(main_opening(BinaryName::FILEINPUTSTREAM));
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);

    let bugs = analyze(main_opening(BinaryName::FILEREADER));
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);

    // Output still has to be flushed and closed
    let bugs = analyze(main_opening(BinaryName::FILEWRITER));
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].instance.leaked_type, BinaryName::WRITER);
}

#[test]
fn handing_off_the_stream() {
    // static void parse(String path) { Parser.consume(new FileInputStream(path)); }
    let mut builder = CodeBuilder::new();
    construct(&mut builder, BinaryName::FILEINPUTSTREAM, "(Ljava/lang/String;)V");
    builder.push_instruction(invoke(
        InvokeType::Static,
        BinaryName::from_dotted("app.Parser").unwrap(),
        "consume",
        "(Ljava/io/InputStream;)V",
    ));
    builder.push_branch(BranchInstruction::Return);
    let bugs = analyze(static_method("parse", "(Ljava/lang/String;)V", builder));
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);

    // Properties.load only borrows the stream
    let mut builder = CodeBuilder::new();
    construct(&mut builder, BinaryName::FILEINPUTSTREAM, "(Ljava/lang/String;)V");
    builder.push_instruction(Instruction::AStore(1));
    builder.push_instruction(Instruction::New(BinaryName::PROPERTIES));
    builder.push_instruction(Instruction::Dup);
    builder.push_instruction(invoke(InvokeType::Special, BinaryName::PROPERTIES, "<init>", "()V"));
    builder.push_instruction(Instruction::ALoad(1));
    builder.push_instruction(invoke(
        InvokeType::Virtual,
        BinaryName::PROPERTIES,
        "load",
        "(Ljava/io/InputStream;)V",
    ));
    builder.push_branch(BranchInstruction::Return);
    let bugs = analyze(static_method("settings", "(Ljava/lang/String;)V", builder));
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].instance.declared_type, BinaryName::FILEINPUTSTREAM);
}

/// `FileInputStream in = new FileInputStream(path)` into local 1
fn open_into_local(builder: &mut CodeBuilder) {
    construct(builder, BinaryName::FILEINPUTSTREAM, "(Ljava/lang/String;)V");
    builder.push_instruction(Instruction::AStore(1));
}

#[test]
fn stream_as_receiver_and_argument() {
    // in.take(in)
    let mut builder = CodeBuilder::new();
    open_into_local(&mut builder);
    builder.push_instruction(Instruction::ALoad(1));
    builder.push_instruction(Instruction::Dup);
    builder.push_instruction(invoke(
        InvokeType::Virtual,
        BinaryName::from_dotted("app.Sink").unwrap(),
        "take",
        "(Ljava/io/InputStream;)V",
    ));
    builder.push_branch(BranchInstruction::Return);

    let bugs = analyze(static_method("read", "(Ljava/lang/String;)V", builder));
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);
}

#[test]
fn implicit_exceptions_are_ignored() {
    // in = new FileInputStream(path); int[] a = null; a[0]; in.close();
    let mut builder = CodeBuilder::new();
    open_into_local(&mut builder);
    builder.push_instruction(Instruction::AConstNull);
    builder.push_instruction(Instruction::IConst0);
    builder.push_instruction(Instruction::IALoad);
    builder.push_instruction(Instruction::Pop);
    call(&mut builder, 1, BinaryName::FILEINPUTSTREAM, "close", "()V");
    builder.push_branch(BranchInstruction::Return);

    let bugs = analyze(static_method("read", "(Ljava/lang/String;)V", builder));
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);
}

#[test]
fn channel_of_the_stream_escapes() {
    // in = new FileInputStream(path); in.getChannel();
    let mut builder = CodeBuilder::new();
    open_into_local(&mut builder);
    call(
        &mut builder,
        1,
        BinaryName::FILEINPUTSTREAM,
        "getChannel",
        "()Ljava/nio/channels/FileChannel;",
    );
    builder.push_instruction(Instruction::Pop);
    builder.push_branch(BranchInstruction::Return);

    let bugs = analyze(static_method("channel", "(Ljava/lang/String;)V", builder));
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);
}

/// `in = new FileInputStream(path); <owner>.load(in, null);` with the owner in local 0
fn load_into(owner: BinaryName) -> Method {
    let mut builder = CodeBuilder::new();
    builder.push_instruction(Instruction::New(BinaryName::FILEINPUTSTREAM));
    builder.push_instruction(Instruction::Dup);
    builder.push_instruction(Instruction::ALoad(1));
    builder.push_instruction(invoke(
        InvokeType::Special,
        BinaryName::FILEINPUTSTREAM,
        "<init>",
        "(Ljava/lang/String;)V",
    ));
    builder.push_instruction(Instruction::AStore(2));
    builder.push_instruction(Instruction::ALoad(0));
    builder.push_instruction(Instruction::ALoad(2));
    builder.push_instruction(Instruction::AConstNull);
    builder.push_instruction(invoke(
        InvokeType::Virtual,
        owner.clone(),
        "load",
        "(Ljava/io/InputStream;[C)V",
    ));
    builder.push_branch(BranchInstruction::Return);
    let descriptor = format!("(L{};Ljava/lang/String;)V", owner.as_str());
    static_method("unlock", &descriptor, builder)
}

#[test]
fn key_store_only_borrows_the_stream() {
    let bugs = analyze(load_into(BinaryName::KEYSTORE));
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].instance.declared_type, BinaryName::FILEINPUTSTREAM);

    // Any other loader may keep the stream
    let bugs = analyze(load_into(BinaryName::from_dotted("app.Vault").unwrap()));
    assert!(bugs.is_empty(), "unexpected findings: {:?}", bugs);
}

#[test]
fn abandoned_resources_leave_the_rest() {
    // static void copy(InputStream in, String path) with a handler that is only reachable
    // through an implicit exception and rejoins with an extra word on the stack
    let mut builder = CodeBuilder::new();
    let handler = builder.fresh_label();
    let join = builder.fresh_label();
    builder.mark_line(40);
    builder.push_instruction(Instruction::New(BinaryName::FILEINPUTSTREAM));
    builder.push_instruction(Instruction::Dup);
    builder.push_instruction(Instruction::ALoad(1));
    builder.push_instruction(invoke(
        InvokeType::Special,
        BinaryName::FILEINPUTSTREAM,
        "<init>",
        "(Ljava/lang/String;)V",
    ));
    builder.push_instruction(Instruction::AStore(2));
    let start = builder.here();
    builder.push_instruction(Instruction::AConstNull);
    builder.push_instruction(Instruction::ArrayLength);
    let end = builder.here();
    builder.push_instruction(Instruction::Pop);
    builder.place_label(join).unwrap();
    builder.push_branch(BranchInstruction::Return);
    builder.place_label(handler).unwrap();
    builder.push_branch(BranchInstruction::Goto(join));
    builder.add_exception_handler(start, end, handler, None);

    // The parameter follows the implicit edge and fails, the stream created here doesn't
    let bugs = analyze(static_method(
        "copy",
        "(Ljava/io/InputStream;Ljava/lang/String;)V",
        builder,
    ));
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].instance.declared_type, BinaryName::FILEINPUTSTREAM);
    assert_eq!(bugs[0].lines[0].line, Some(40));
}

#[test]
fn failing_methods_leave_the_rest() {
    // Jumps past the end of the code, so there is no control flow graph
    let mut builder = CodeBuilder::new();
    let end = builder.fresh_label();
    builder.push_instruction(Instruction::New(BinaryName::FILEINPUTSTREAM));
    builder.push_instruction(Instruction::Pop);
    builder.push_branch(BranchInstruction::Goto(end));
    builder.place_label(end).unwrap();
    let no_cfg = static_method("noCfg", "(Ljava/lang/String;)V", builder);

    // Paths join with different stack heights
    let mut builder = CodeBuilder::new();
    let join = builder.fresh_label();
    open_into_local(&mut builder);
    builder.push_instruction(Instruction::ALoad(1));
    builder.push_branch(BranchInstruction::IfNull(EqComparison::EQ, join));
    builder.push_instruction(Instruction::IConst0);
    builder.place_label(join).unwrap();
    builder.push_branch(BranchInstruction::Return);
    let uneven = static_method("uneven", "(Ljava/lang/String;)V", builder);

    let mut builder = CodeBuilder::new();
    builder.mark_line(50);
    open_into_local(&mut builder);
    builder.push_branch(BranchInstruction::Return);
    let leaky = static_method("leaky", "(Ljava/lang/String;)V", builder);

    let bugs = analyze_class(&Settings::default(), vec![no_cfg, uneven, leaky]);
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].instance.method_name, "leaky");
    assert_eq!(bugs[0].lines[0].line, Some(50));
}
