#![allow(missing_docs)]
#![allow(missing_debug_implementations)]

use std::env;
use std::path;
use std::sync::{Mutex, MutexGuard};

lazy_static! {
    static ref CWD: Mutex<()> = Mutex::new(());
}

/// Tests that reduce real files do so against paths relative to the process
/// working directory, so they must not run concurrently with each other.
/// Hold the guard for the duration of the test.
pub struct ScratchDir {
    _guard: MutexGuard<'static, ()>,
    previous: path::PathBuf,
    dir: ::tempdir::TempDir,
}

impl ScratchDir {
    pub fn new(name: &str) -> ScratchDir {
        let guard = match CWD.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = env::current_dir().expect("should get the current directory");
        let dir = ::tempdir::TempDir::new(name).expect("should create a scratch directory");
        env::set_current_dir(dir.path()).expect("should enter the scratch directory");
        ScratchDir {
            _guard: guard,
            previous: previous,
            dir: dir,
        }
    }

    pub fn path(&self) -> &path::Path {
        self.dir.path()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.previous);
    }
}

/// Write an executable shell script into the scratch directory and return
/// its absolute path.
pub fn write_script(name: &str, contents: &str) -> path::PathBuf {
    use std::fs;
    use std::io::Write;

    let path = env::current_dir().unwrap().join(name);
    {
        let mut file = fs::File::create(&path).unwrap();
        writeln!(&mut file, "#!/bin/sh").unwrap();
        writeln!(&mut file, "{}", contents).unwrap();
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
    }

    path
}

/// Write a plain file relative to the scratch directory.
pub fn write_file(path: &path::Path, contents: &str) {
    use std::fs;
    use std::io::Write;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).unwrap();
        }
    }
    let mut file = fs::File::create(path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
}

/// Slurp a file into a string.
pub fn read_file(path: &path::Path) -> String {
    use std::fs;
    use std::io::Read;

    let mut contents = String::new();
    fs::File::open(path)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    contents
}
