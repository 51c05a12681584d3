//! Test fixtures for weft
//!
//! Small Go sources exercising each built-in aspect, a catalog covering every
//! advice kind, and on-disk package layouts for the toolchain tests.

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

/// HTTP server and client code matched by the built-in catalog.
pub const SERVER_GO: &str = r#"package server

import (
	"net/http"

	"github.com/gorilla/mux"
)

func Serve(addr string) error {
	r := mux.NewRouter()
	r.HandleFunc("/health", health)

	srv := &http.Server{
		Addr:    addr,
		Handler: r,
	}
	return srv.ListenAndServe()
}

func Fetch(url string) (*http.Response, error) {
	return http.Get(url)
}

func health(w http.ResponseWriter, _ *http.Request) {
	w.WriteHeader(http.StatusOK)
}
"#;

/// Functions annotated for spans, one without a context to hand over.
pub const SPAN_GO: &str = r#"package store

import (
	"context"
	"errors"
)

type Store struct{}

//weft:span name:store.load
func (s *Store) Load(ctx context.Context, key string) ([]byte, error) {
	if key == "" {
		return nil, errors.New("empty key")
	}
	return []byte(key), nil
}

//weft:span
func Compact(level int) error {
	return nil
}
"#;

/// A call that would match, suppressed by an ignore directive.
pub const IGNORED_GO: &str = r#"package client

import "net/http"

//weft:ignore
func Raw(url string) (*http.Response, error) {
	return http.Get(url)
}

func Traced(url string) (*http.Response, error) {
	return http.Get(url)
}
"#;

/// Nothing in here matches the built-in catalog.
pub const PLAIN_GO: &str = r#"package mathx

// Clamp limits v to [lo, hi].
func Clamp(v, lo, hi int) int {
	if v < lo {
		return lo
	}
	if v > hi {
		return hi
	}
	return v
}
"#;

/// gRPC servers built with and without a spread option list.
pub const GRPC_GO: &str = r#"package rpc

import "google.golang.org/grpc"

func New(opts []grpc.ServerOption) (*grpc.Server, *grpc.Server) {
	plain := grpc.NewServer()
	spread := grpc.NewServer(opts...)
	return plain, spread
}
"#;

/// Program entry point; receives the runtime bootstrap declarations.
pub const MAIN_GO: &str = r#"package main

import (
	"database/sql"
	"fmt"
)

func main() {
	db, err := sql.Open("postgres", "dsn")
	fmt.Println(db, err)
}
"#;

/// Second file of the main package; shares references with `MAIN_GO`.
pub const MAIN_HTTP_GO: &str = r#"package main

import "net/http"

func fetch() {
	_, _ = http.Get("http://localhost")
	_, _ = http.Post("http://localhost", "text/plain", nil)
}
"#;

/// Bootstrap package of the runtime library.
pub const BOOT_GO: &str = r#"package boot

var Enabled bool
"#;

pub const BOOT_IMPORT_PATH: &str = "github.com/weft-dev/weft/runtime/internal/boot";

/// Go source of a struct and a flag, for the catalog below.
pub const CONFIG_GO: &str = r#"package config

import "net/http"

type Options struct {
	Name string
}

var Verbose bool

var Retries = 3

func Client() *http.Client {
	c := &http.Client{}
	resp, err := c.Do(nil)
	_, _ = resp, err
	return c
}
"#;

/// Catalog exercising every advice kind against `CONFIG_GO`.
pub const CONFIG_CATALOG: &str = r#"
runtime-packages:
  - example.com/runtime
aspects:
  - id: options-tracer
    join-point:
      type-declaration: Options
    advice:
      - add-struct-field:
          name: Tracer
          type: "*example.com/runtime/trace.Tracer"
  - id: verbose-on
    join-point:
      value-declaration:
        name: Verbose
    advice:
      - assign-value:
          template: "true"
  - id: more-retries
    join-point:
      value-declaration:
        name: Retries
    advice:
      - assign-value:
          template: "{{ expr }} * 2"
  - id: client-do
    join-point:
      method-call:
        receiver: "*net/http.Client"
        name: Do
    advice:
      - wrap-expression:
          template: "rhttp.Report({{ expr }})"
          imports:
            rhttp: example.com/runtime/http
  - id: config-marker
    join-point:
      function:
        name: Client
    advice:
      - inject-declarations:
          template: |
            //go:linkname __weft_config example.com/runtime/config.Loaded
            var __weft_config bool
          imports:
            _: unsafe
          links:
            - example.com/runtime/config
"#;

/// Test fixture categories
pub enum FixtureType {
    /// A `main` package spread over two files.
    MainPackage,
    /// A package matched by nothing.
    PlainPackage,
}

/// Main test fixtures provider
pub struct TestFixtures {
    temp_dir: Option<tempfile::TempDir>,
}

impl Default for TestFixtures {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixtures {
    pub fn new() -> Self {
        Self { temp_dir: None }
    }

    /// Create a temporary directory holding the package's files
    pub fn setup(&mut self, fixture_type: FixtureType) -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();

        match fixture_type {
            FixtureType::MainPackage => {
                write(&path, "main.go", MAIN_GO);
                write(&path, "fetch.go", MAIN_HTTP_GO);
            }
            FixtureType::PlainPackage => write(&path, "clamp.go", PLAIN_GO),
        }

        self.temp_dir = Some(dir);
        path
    }

    /// Go files of the fixture set up last, sorted by name.
    pub fn go_files(&self) -> Vec<PathBuf> {
        let Some(dir) = &self.temp_dir else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.extension().map(|e| e == "go").unwrap_or(false))
            .collect();
        files.sort();
        files
    }
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

/// One package object as printed by `go list -json -deps -export`.
pub fn go_list_package(import_path: &str, export: Option<&str>, deps: &[&str]) -> serde_json::Value {
    let mut package = json!({
        "ImportPath": import_path,
        "Name": import_path.rsplit('/').next().unwrap_or(import_path),
        "Deps": deps,
    });
    if let Some(export) = export {
        package["Export"] = json!(export);
    }
    package
}

/// Concatenated `go list -json` output for several packages.
pub fn go_list_output(packages: &[serde_json::Value]) -> String {
    packages
        .iter()
        .map(|p| serde_json::to_string_pretty(p).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}
