//! Shared helpers for integration tests: a fake `sops` executable.
//!
//! The fake "encrypts" by prefixing a `# fake-sops` header line and
//! "decrypts" by stripping it again, so round trips are byte-exact. Every
//! invocation is appended to `calls.log` as `<AWS_PROFILE or none> <args>`.
//!
//! Behaviour switches:
//! - plaintext containing `fail-tool`: exit 1 with a stderr message
//! - plaintext containing `hang-tool`: sleep 30s before answering
//! - flag `empty-output`: encrypt succeeds but prints nothing
//! - flag `garbage-output`: decrypt prints malformed YAML
//! - flag `fail-updatekeys`: updatekeys exits 1
//! - flag `truncate-updatekeys`: updatekeys empties the file and exits 0

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, SystemTime};

use sops_wrapper::config::ToolTimeouts;
use sops_wrapper::tool_runner::ToolRunner;
use tempfile::TempDir;

const FAKE_SOPS: &str = r##"#!/usr/bin/env bash
dir="$(cd "$(dirname "$0")" && pwd)"
echo "${AWS_PROFILE:-none} $*" >> "$dir/calls.log"

if [ "$1" = "--version" ]; then
  echo "sops 3.9.0 (fake)"
  exit 0
fi

if [ "$1" = "updatekeys" ]; then
  file="${@: -1}"
  if [ -e "$dir/fail-updatekeys" ]; then
    echo "updatekeys denied for $file" >&2
    exit 1
  fi
  if [ -e "$dir/truncate-updatekeys" ]; then
    : > "$file"
    exit 0
  fi
  touch "$file"
  exit 0
fi

mode=""
file=""
for arg in "$@"; do
  case "$arg" in
    -e) mode=encrypt ;;
    -d) mode=decrypt ;;
    --input-type|--output-type|yaml) ;;
    *) file="$arg" ;;
  esac
done

if [ -z "$file" ] || [ ! -f "$file" ]; then
  echo "no such file: $file" >&2
  exit 2
fi
if grep -q "fail-tool" "$file"; then
  echo "sops failed on $file" >&2
  exit 1
fi
if grep -q "hang-tool" "$file"; then
  sleep 30
fi

case "$mode" in
  encrypt)
    if [ -e "$dir/empty-output" ]; then
      exit 0
    fi
    echo "# fake-sops"
    cat "$file"
    ;;
  decrypt)
    if [ "$(head -n 1 "$file")" != "# fake-sops" ]; then
      echo "Error: sops metadata not found" >&2
      exit 1
    fi
    if [ -e "$dir/garbage-output" ]; then
      echo "key: [unclosed"
      exit 0
    fi
    tail -n +2 "$file"
    ;;
  *)
    echo "unsupported invocation" >&2
    exit 2
    ;;
esac
"##;

/// A fake sops binary installed in its own temporary directory.
pub struct FakeSops {
    dir: TempDir,
    binary: PathBuf,
}

impl FakeSops {
    pub fn install() -> Self {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("sops");
        fs::write(&binary, FAKE_SOPS).unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();

        let fake = Self { dir, binary };
        fake.wait_until_executable();
        fake
    }

    /// Other test threads forking while the script was open for writing can
    /// make the first exec fail with ETXTBSY; retry until it runs.
    fn wait_until_executable(&self) {
        for _ in 0..100 {
            if let Ok(status) = Command::new(&self.binary).arg("--version").status() {
                if status.success() {
                    let _ = fs::remove_file(self.dir.path().join("calls.log"));
                    return;
                }
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!("fake sops never became executable");
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn runner(&self) -> ToolRunner {
        self.runner_with(Vec::new(), ToolTimeouts::default())
    }

    pub fn runner_with(&self, env: Vec<(String, String)>, timeouts: ToolTimeouts) -> ToolRunner {
        ToolRunner::new(&self.binary, env, timeouts)
    }

    pub fn set_flag(&self, name: &str) {
        fs::write(self.dir.path().join(name), "").unwrap();
    }

    pub fn clear_flag(&self, name: &str) {
        let _ = fs::remove_file(self.dir.path().join(name));
    }

    /// Logged invocations, oldest first.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls().iter().filter(|line| line.contains(needle)).count()
    }

    pub fn clear_calls(&self) {
        let _ = fs::remove_file(self.dir.path().join("calls.log"));
    }
}

/// Write `content` to `path`, creating parent directories.
pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}
