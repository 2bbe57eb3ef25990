use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data:
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

/// Renders in the dotted form used in Java source (`java.io.InputStream`)
impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(&self.to_dotted())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    // JDK names
    pub const CLOSE: Self = Self::name("close");
    pub const GETCHANNEL: Self = Self::name("getChannel");
    pub const LOAD: Self = Self::name("load");
    pub const LOADFROMXML: Self = Self::name("loadFromXml");
    pub const MAIN: Self = Self::name("main");
    pub const SAVE: Self = Self::name("save");
    pub const STORE: Self = Self::name("store");

    // Constructor name (the only name here with angle brackets in it)
    pub const INIT: Self = Self::name("<init>");
}

impl BinaryName {
    /// Build a binary name from either the dotted (`java.io.Reader`) or the internal
    /// (`java/io/Reader`) spelling
    pub fn from_dotted(name: &str) -> Result<BinaryName, String> {
        BinaryName::from_string(name.replace('.', "/"))
    }

    /// Dotted spelling of the name (`java/io/Reader` becomes `java.io.Reader`)
    pub fn to_dotted(&self) -> String {
        self.as_str().replace('/', ".")
    }

    /// Last segment of the name (`java/io/Reader` becomes `Reader`)
    pub fn simple_name(&self) -> &str {
        let name = self.as_str();
        match name.rfind('/') {
            Some(idx) => &name[idx + 1..],
            None => name,
        }
    }

    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // java.lang
    pub const APPENDABLE: Self = Self::name("java/lang/Appendable");
    pub const AUTOCLOSEABLE: Self = Self::name("java/lang/AutoCloseable");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const READABLE: Self = Self::name("java/lang/Readable");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");

    // java.io
    pub const BUFFEREDINPUTSTREAM: Self = Self::name("java/io/BufferedInputStream");
    pub const BUFFEREDOUTPUTSTREAM: Self = Self::name("java/io/BufferedOutputStream");
    pub const BUFFEREDREADER: Self = Self::name("java/io/BufferedReader");
    pub const BUFFEREDWRITER: Self = Self::name("java/io/BufferedWriter");
    pub const BYTEARRAYINPUTSTREAM: Self = Self::name("java/io/ByteArrayInputStream");
    pub const BYTEARRAYOUTPUTSTREAM: Self = Self::name("java/io/ByteArrayOutputStream");
    pub const CLOSEABLE: Self = Self::name("java/io/Closeable");
    pub const DATAINPUTSTREAM: Self = Self::name("java/io/DataInputStream");
    pub const DATAOUTPUTSTREAM: Self = Self::name("java/io/DataOutputStream");
    pub const FILEINPUTSTREAM: Self = Self::name("java/io/FileInputStream");
    pub const FILEOUTPUTSTREAM: Self = Self::name("java/io/FileOutputStream");
    pub const FILEREADER: Self = Self::name("java/io/FileReader");
    pub const FILEWRITER: Self = Self::name("java/io/FileWriter");
    pub const FILTERINPUTSTREAM: Self = Self::name("java/io/FilterInputStream");
    pub const FILTEROUTPUTSTREAM: Self = Self::name("java/io/FilterOutputStream");
    pub const FLUSHABLE: Self = Self::name("java/io/Flushable");
    pub const INPUTSTREAM: Self = Self::name("java/io/InputStream");
    pub const INPUTSTREAMREADER: Self = Self::name("java/io/InputStreamReader");
    pub const IOEXCEPTION: Self = Self::name("java/io/IOException");
    pub const OBJECTINPUTSTREAM: Self = Self::name("java/io/ObjectInputStream");
    pub const OBJECTOUTPUTSTREAM: Self = Self::name("java/io/ObjectOutputStream");
    pub const OUTPUTSTREAM: Self = Self::name("java/io/OutputStream");
    pub const OUTPUTSTREAMWRITER: Self = Self::name("java/io/OutputStreamWriter");
    pub const PRINTSTREAM: Self = Self::name("java/io/PrintStream");
    pub const PRINTWRITER: Self = Self::name("java/io/PrintWriter");
    pub const RANDOMACCESSFILE: Self = Self::name("java/io/RandomAccessFile");
    pub const READER: Self = Self::name("java/io/Reader");
    pub const STRINGREADER: Self = Self::name("java/io/StringReader");
    pub const STRINGWRITER: Self = Self::name("java/io/StringWriter");
    pub const WRITER: Self = Self::name("java/io/Writer");

    // java.util
    pub const DICTIONARY: Self = Self::name("java/util/Dictionary");
    pub const HASHTABLE: Self = Self::name("java/util/Hashtable");
    pub const MAP: Self = Self::name("java/util/Map");
    pub const PROPERTIES: Self = Self::name("java/util/Properties");
    pub const SCANNER: Self = Self::name("java/util/Scanner");

    // java.util.zip and java.util.jar
    pub const DEFLATEROUTPUTSTREAM: Self = Self::name("java/util/zip/DeflaterOutputStream");
    pub const GZIPINPUTSTREAM: Self = Self::name("java/util/zip/GZIPInputStream");
    pub const GZIPOUTPUTSTREAM: Self = Self::name("java/util/zip/GZIPOutputStream");
    pub const INFLATERINPUTSTREAM: Self = Self::name("java/util/zip/InflaterInputStream");
    pub const ZIPFILE: Self = Self::name("java/util/zip/ZipFile");
    pub const ZIPINPUTSTREAM: Self = Self::name("java/util/zip/ZipInputStream");
    pub const ZIPOUTPUTSTREAM: Self = Self::name("java/util/zip/ZipOutputStream");
    pub const JARFILE: Self = Self::name("java/util/jar/JarFile");
    pub const JARINPUTSTREAM: Self = Self::name("java/util/jar/JarInputStream");
    pub const JAROUTPUTSTREAM: Self = Self::name("java/util/jar/JarOutputStream");

    // java.security
    pub const KEYSTORE: Self = Self::name("java/security/KeyStore");

    // java.nio
    pub const ABSTRACTINTERRUPTIBLECHANNEL: Self =
        Self::name("java/nio/channels/spi/AbstractInterruptibleChannel");
    pub const CHANNEL: Self = Self::name("java/nio/channels/Channel");
    pub const FILECHANNEL: Self = Self::name("java/nio/channels/FileChannel");

    // java.net
    pub const SERVERSOCKET: Self = Self::name("java/net/ServerSocket");
    pub const SOCKET: Self = Self::name("java/net/Socket");

    // java.sql
    pub const CALLABLESTATEMENT: Self = Self::name("java/sql/CallableStatement");
    pub const CONNECTION: Self = Self::name("java/sql/Connection");
    pub const DRIVERMANAGER: Self = Self::name("java/sql/DriverManager");
    pub const PREPAREDSTATEMENT: Self = Self::name("java/sql/PreparedStatement");
    pub const RESULTSET: Self = Self::name("java/sql/ResultSet");
    pub const STATEMENT: Self = Self::name("java/sql/Statement");
}
