use super::{BinaryName, ClassData, ClassGraph};
use elsa::FrozenVec;

/// The JDK classes relevant to resource tracking
///
/// Only supertype edges are modelled. The list covers the default resource base types, their
/// common implementations and the classes whose methods are special-cased (`Properties`,
/// `KeyStore`, `FileChannel`).
pub struct JavaClasses<'g> {
    pub lang: LangClasses<'g>,
    pub io: IoClasses<'g>,
    pub util: UtilClasses<'g>,
    pub zip: ZipClasses<'g>,
    pub nio: NioClasses<'g>,
    pub net: NetClasses<'g>,
    pub security: SecurityClasses<'g>,
    pub sql: SqlClasses<'g>,
}

/// Classes inside `java.lang.*`
pub struct LangClasses<'g> {
    pub object: &'g ClassData<'g>,
    pub auto_closeable: &'g ClassData<'g>,
    pub readable: &'g ClassData<'g>,
    pub appendable: &'g ClassData<'g>,
    pub string: &'g ClassData<'g>,
    pub throwable: &'g ClassData<'g>,
    pub error: &'g ClassData<'g>,
    pub exception: &'g ClassData<'g>,
    pub runtime_exception: &'g ClassData<'g>,
}

/// Classes inside `java.io.*`
pub struct IoClasses<'g> {
    pub closeable: &'g ClassData<'g>,
    pub flushable: &'g ClassData<'g>,
    pub io_exception: &'g ClassData<'g>,

    pub input_stream: &'g ClassData<'g>,
    pub file_input_stream: &'g ClassData<'g>,
    pub filter_input_stream: &'g ClassData<'g>,
    pub buffered_input_stream: &'g ClassData<'g>,
    pub data_input_stream: &'g ClassData<'g>,
    pub object_input_stream: &'g ClassData<'g>,
    pub byte_array_input_stream: &'g ClassData<'g>,

    pub output_stream: &'g ClassData<'g>,
    pub file_output_stream: &'g ClassData<'g>,
    pub filter_output_stream: &'g ClassData<'g>,
    pub buffered_output_stream: &'g ClassData<'g>,
    pub data_output_stream: &'g ClassData<'g>,
    pub object_output_stream: &'g ClassData<'g>,
    pub byte_array_output_stream: &'g ClassData<'g>,
    pub print_stream: &'g ClassData<'g>,

    pub reader: &'g ClassData<'g>,
    pub input_stream_reader: &'g ClassData<'g>,
    pub file_reader: &'g ClassData<'g>,
    pub buffered_reader: &'g ClassData<'g>,
    pub string_reader: &'g ClassData<'g>,

    pub writer: &'g ClassData<'g>,
    pub output_stream_writer: &'g ClassData<'g>,
    pub file_writer: &'g ClassData<'g>,
    pub buffered_writer: &'g ClassData<'g>,
    pub print_writer: &'g ClassData<'g>,
    pub string_writer: &'g ClassData<'g>,

    pub random_access_file: &'g ClassData<'g>,
}

/// Classes inside `java.util.*`
pub struct UtilClasses<'g> {
    pub map: &'g ClassData<'g>,
    pub dictionary: &'g ClassData<'g>,
    pub hashtable: &'g ClassData<'g>,
    pub properties: &'g ClassData<'g>,
    pub scanner: &'g ClassData<'g>,
}

/// Classes inside `java.util.zip.*` and `java.util.jar.*`
pub struct ZipClasses<'g> {
    pub zip_file: &'g ClassData<'g>,
    pub inflater_input_stream: &'g ClassData<'g>,
    pub zip_input_stream: &'g ClassData<'g>,
    pub gzip_input_stream: &'g ClassData<'g>,
    pub deflater_output_stream: &'g ClassData<'g>,
    pub zip_output_stream: &'g ClassData<'g>,
    pub gzip_output_stream: &'g ClassData<'g>,
    pub jar_file: &'g ClassData<'g>,
    pub jar_input_stream: &'g ClassData<'g>,
    pub jar_output_stream: &'g ClassData<'g>,
}

/// Classes inside `java.nio.channels.*`
pub struct NioClasses<'g> {
    pub channel: &'g ClassData<'g>,
    pub abstract_interruptible_channel: &'g ClassData<'g>,
    pub file_channel: &'g ClassData<'g>,
}

/// Classes inside `java.net.*`
pub struct NetClasses<'g> {
    pub socket: &'g ClassData<'g>,
    pub server_socket: &'g ClassData<'g>,
}

/// Classes inside `java.security.*`
pub struct SecurityClasses<'g> {
    pub key_store: &'g ClassData<'g>,
}

/// Classes inside `java.sql.*`
pub struct SqlClasses<'g> {
    pub driver_manager: &'g ClassData<'g>,
    pub connection: &'g ClassData<'g>,
    pub statement: &'g ClassData<'g>,
    pub prepared_statement: &'g ClassData<'g>,
    pub callable_statement: &'g ClassData<'g>,
    pub result_set: &'g ClassData<'g>,
}

impl<'g> JavaClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> JavaClasses<'g> {
        let lang = LangClasses::add_to_graph(class_graph);
        let io = IoClasses::add_to_graph(class_graph, &lang);
        let util = UtilClasses::add_to_graph(class_graph, &lang, &io);
        let zip = ZipClasses::add_to_graph(class_graph, &lang, &io);
        let nio = NioClasses::add_to_graph(class_graph, &lang, &io);
        let net = NetClasses::add_to_graph(class_graph, &lang, &io);
        let security = SecurityClasses::add_to_graph(class_graph, &lang);
        let sql = SqlClasses::add_to_graph(class_graph, &lang);

        JavaClasses {
            lang,
            io,
            util,
            zip,
            nio,
            net,
            security,
            sql,
        }
    }
}

impl<'g> LangClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> LangClasses<'g> {
        let object = class_graph.add_class(ClassData {
            name: BinaryName::OBJECT,
            superclass: None,
            interfaces: FrozenVec::new(),
            is_interface: false,
            missing_supertypes: vec![],
        });
        let auto_closeable =
            class_graph.add_class(ClassData::new(BinaryName::AUTOCLOSEABLE, object, true));
        let readable = class_graph.add_class(ClassData::new(BinaryName::READABLE, object, true));
        let appendable =
            class_graph.add_class(ClassData::new(BinaryName::APPENDABLE, object, true));
        let string = class_graph.add_class(ClassData::new(BinaryName::STRING, object, false));
        let throwable =
            class_graph.add_class(ClassData::new(BinaryName::THROWABLE, object, false));
        let error = class_graph.add_class(ClassData::new(BinaryName::ERROR, throwable, false));
        let exception =
            class_graph.add_class(ClassData::new(BinaryName::EXCEPTION, throwable, false));
        let runtime_exception = class_graph.add_class(ClassData::new(
            BinaryName::RUNTIMEEXCEPTION,
            exception,
            false,
        ));

        LangClasses {
            object,
            auto_closeable,
            readable,
            appendable,
            string,
            throwable,
            error,
            exception,
            runtime_exception,
        }
    }
}

impl<'g> IoClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>, lang: &LangClasses<'g>) -> IoClasses<'g> {
        let class = |name: BinaryName, superclass: &'g ClassData<'g>| {
            class_graph.add_class(ClassData::new(name, superclass, false))
        };

        let closeable = class_graph.add_class(ClassData::new(
            BinaryName::CLOSEABLE,
            lang.object,
            true,
        ));
        closeable.interfaces.push(lang.auto_closeable);
        let flushable = class_graph.add_class(ClassData::new(
            BinaryName::FLUSHABLE,
            lang.object,
            true,
        ));
        let io_exception = class(BinaryName::IOEXCEPTION, lang.exception);

        let input_stream = class(BinaryName::INPUTSTREAM, lang.object);
        input_stream.interfaces.push(closeable);
        let file_input_stream = class(BinaryName::FILEINPUTSTREAM, input_stream);
        let filter_input_stream = class(BinaryName::FILTERINPUTSTREAM, input_stream);
        let buffered_input_stream = class(BinaryName::BUFFEREDINPUTSTREAM, filter_input_stream);
        let data_input_stream = class(BinaryName::DATAINPUTSTREAM, filter_input_stream);
        let object_input_stream = class(BinaryName::OBJECTINPUTSTREAM, input_stream);
        let byte_array_input_stream = class(BinaryName::BYTEARRAYINPUTSTREAM, input_stream);

        let output_stream = class(BinaryName::OUTPUTSTREAM, lang.object);
        output_stream.interfaces.push(closeable);
        output_stream.interfaces.push(flushable);
        let file_output_stream = class(BinaryName::FILEOUTPUTSTREAM, output_stream);
        let filter_output_stream = class(BinaryName::FILTEROUTPUTSTREAM, output_stream);
        let buffered_output_stream =
            class(BinaryName::BUFFEREDOUTPUTSTREAM, filter_output_stream);
        let data_output_stream = class(BinaryName::DATAOUTPUTSTREAM, filter_output_stream);
        let object_output_stream = class(BinaryName::OBJECTOUTPUTSTREAM, output_stream);
        let byte_array_output_stream = class(BinaryName::BYTEARRAYOUTPUTSTREAM, output_stream);
        let print_stream = class(BinaryName::PRINTSTREAM, filter_output_stream);
        print_stream.interfaces.push(lang.appendable);

        let reader = class(BinaryName::READER, lang.object);
        reader.interfaces.push(lang.readable);
        reader.interfaces.push(closeable);
        let input_stream_reader = class(BinaryName::INPUTSTREAMREADER, reader);
        let file_reader = class(BinaryName::FILEREADER, input_stream_reader);
        let buffered_reader = class(BinaryName::BUFFEREDREADER, reader);
        let string_reader = class(BinaryName::STRINGREADER, reader);

        let writer = class(BinaryName::WRITER, lang.object);
        writer.interfaces.push(lang.appendable);
        writer.interfaces.push(closeable);
        writer.interfaces.push(flushable);
        let output_stream_writer = class(BinaryName::OUTPUTSTREAMWRITER, writer);
        let file_writer = class(BinaryName::FILEWRITER, output_stream_writer);
        let buffered_writer = class(BinaryName::BUFFEREDWRITER, writer);
        let print_writer = class(BinaryName::PRINTWRITER, writer);
        let string_writer = class(BinaryName::STRINGWRITER, writer);

        let random_access_file = class(BinaryName::RANDOMACCESSFILE, lang.object);
        random_access_file.interfaces.push(closeable);

        IoClasses {
            closeable,
            flushable,
            io_exception,
            input_stream,
            file_input_stream,
            filter_input_stream,
            buffered_input_stream,
            data_input_stream,
            object_input_stream,
            byte_array_input_stream,
            output_stream,
            file_output_stream,
            filter_output_stream,
            buffered_output_stream,
            data_output_stream,
            object_output_stream,
            byte_array_output_stream,
            print_stream,
            reader,
            input_stream_reader,
            file_reader,
            buffered_reader,
            string_reader,
            writer,
            output_stream_writer,
            file_writer,
            buffered_writer,
            print_writer,
            string_writer,
            random_access_file,
        }
    }
}

impl<'g> UtilClasses<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        lang: &LangClasses<'g>,
        io: &IoClasses<'g>,
    ) -> UtilClasses<'g> {
        let map = class_graph.add_class(ClassData::new(BinaryName::MAP, lang.object, true));
        let dictionary =
            class_graph.add_class(ClassData::new(BinaryName::DICTIONARY, lang.object, false));
        let hashtable =
            class_graph.add_class(ClassData::new(BinaryName::HASHTABLE, dictionary, false));
        hashtable.interfaces.push(map);
        let properties =
            class_graph.add_class(ClassData::new(BinaryName::PROPERTIES, hashtable, false));
        let scanner =
            class_graph.add_class(ClassData::new(BinaryName::SCANNER, lang.object, false));
        scanner.interfaces.push(io.closeable);

        UtilClasses {
            map,
            dictionary,
            hashtable,
            properties,
            scanner,
        }
    }
}

impl<'g> ZipClasses<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        lang: &LangClasses<'g>,
        io: &IoClasses<'g>,
    ) -> ZipClasses<'g> {
        let class = |name: BinaryName, superclass: &'g ClassData<'g>| {
            class_graph.add_class(ClassData::new(name, superclass, false))
        };

        let zip_file = class(BinaryName::ZIPFILE, lang.object);
        zip_file.interfaces.push(io.closeable);
        let inflater_input_stream = class(BinaryName::INFLATERINPUTSTREAM, io.filter_input_stream);
        let zip_input_stream = class(BinaryName::ZIPINPUTSTREAM, inflater_input_stream);
        let gzip_input_stream = class(BinaryName::GZIPINPUTSTREAM, inflater_input_stream);
        let deflater_output_stream =
            class(BinaryName::DEFLATEROUTPUTSTREAM, io.filter_output_stream);
        let zip_output_stream = class(BinaryName::ZIPOUTPUTSTREAM, deflater_output_stream);
        let gzip_output_stream = class(BinaryName::GZIPOUTPUTSTREAM, deflater_output_stream);
        let jar_file = class(BinaryName::JARFILE, zip_file);
        let jar_input_stream = class(BinaryName::JARINPUTSTREAM, zip_input_stream);
        let jar_output_stream = class(BinaryName::JAROUTPUTSTREAM, zip_output_stream);

        ZipClasses {
            zip_file,
            inflater_input_stream,
            zip_input_stream,
            gzip_input_stream,
            deflater_output_stream,
            zip_output_stream,
            gzip_output_stream,
            jar_file,
            jar_input_stream,
            jar_output_stream,
        }
    }
}

impl<'g> NioClasses<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        lang: &LangClasses<'g>,
        io: &IoClasses<'g>,
    ) -> NioClasses<'g> {
        let channel = class_graph.add_class(ClassData::new(BinaryName::CHANNEL, lang.object, true));
        channel.interfaces.push(io.closeable);
        let abstract_interruptible_channel = class_graph.add_class(ClassData::new(
            BinaryName::ABSTRACTINTERRUPTIBLECHANNEL,
            lang.object,
            false,
        ));
        abstract_interruptible_channel.interfaces.push(channel);
        let file_channel = class_graph.add_class(ClassData::new(
            BinaryName::FILECHANNEL,
            abstract_interruptible_channel,
            false,
        ));

        NioClasses {
            channel,
            abstract_interruptible_channel,
            file_channel,
        }
    }
}

impl<'g> NetClasses<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        lang: &LangClasses<'g>,
        io: &IoClasses<'g>,
    ) -> NetClasses<'g> {
        let socket = class_graph.add_class(ClassData::new(BinaryName::SOCKET, lang.object, false));
        socket.interfaces.push(io.closeable);
        let server_socket =
            class_graph.add_class(ClassData::new(BinaryName::SERVERSOCKET, lang.object, false));
        server_socket.interfaces.push(io.closeable);

        NetClasses {
            socket,
            server_socket,
        }
    }
}

impl<'g> SecurityClasses<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        lang: &LangClasses<'g>,
    ) -> SecurityClasses<'g> {
        let key_store =
            class_graph.add_class(ClassData::new(BinaryName::KEYSTORE, lang.object, false));
        SecurityClasses { key_store }
    }
}

impl<'g> SqlClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>, lang: &LangClasses<'g>) -> SqlClasses<'g> {
        let interface = |name: BinaryName| {
            let interface = class_graph.add_class(ClassData::new(name, lang.object, true));
            interface.interfaces.push(lang.auto_closeable);
            interface
        };

        let driver_manager = class_graph.add_class(ClassData::new(
            BinaryName::DRIVERMANAGER,
            lang.object,
            false,
        ));
        let connection = interface(BinaryName::CONNECTION);
        let statement = interface(BinaryName::STATEMENT);
        let prepared_statement =
            class_graph.add_class(ClassData::new(BinaryName::PREPAREDSTATEMENT, lang.object, true));
        prepared_statement.interfaces.push(statement);
        let callable_statement =
            class_graph.add_class(ClassData::new(BinaryName::CALLABLESTATEMENT, lang.object, true));
        callable_statement.interfaces.push(prepared_statement);
        let result_set = interface(BinaryName::RESULTSET);

        SqlClasses {
            driver_manager,
            connection,
            statement,
            prepared_statement,
            callable_statement,
            result_set,
        }
    }
}
