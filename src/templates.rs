//! Named HTML template rendering with an optional shared layout.
//!
//! Templates are plain files under a source directory. A page renders
//! either composed with the configured layout ([`Templates::render`]) or
//! standalone ([`Templates::render_only`]). When composing, the layout
//! source is registered under the name `layout` and the page under
//! `content`; the layout pulls the page in where it wants it:
//!
//! ```html
//! <html><body>{% include "content" %}</body></html>
//! ```
//!
//! Compiled environments are cached per `(layout, name)` key behind a
//! read-write lock. Development mode bypasses the cache entirely — every
//! call re-reads sources from disk, trading throughput for edit-reload
//! convenience. That is a deliberate policy, not an accident.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use minijinja::Environment;
use serde::Serialize;

use crate::error::Error;

const LAYOUT_NAME: &str = "layout";
const CONTENT_NAME: &str = "content";

/// Template source configuration and compile cache.
///
/// ```rust,no_run
/// use basalt::Templates;
///
/// let templates = Templates::new("templates")
///     .extension(".html")
///     .layout("_layout")
///     .development(false);
/// ```
pub struct Templates {
    directory: PathBuf,
    extension: String,
    layout: String,
    development: bool,
    configure: Option<Arc<dyn Fn(&mut Environment<'static>) + Send + Sync>>,
    cache: RwLock<HashMap<String, Arc<Environment<'static>>>>,
}

impl Default for Templates {
    fn default() -> Self {
        Self::new("templates")
    }
}

impl Templates {
    /// Template set rooted at `directory`, with the default `.html`
    /// extension and `_layout` layout name.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            extension: ".html".to_owned(),
            layout: "_layout".to_owned(),
            development: false,
            configure: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The file extension appended to template names (including the dot).
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// The name of the shared layout template.
    pub fn layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }

    /// When set, every render recompiles from disk and nothing is cached.
    pub fn development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    /// Hook invoked on each freshly built environment; register custom
    /// functions and filters for template expressions here.
    ///
    /// ```rust,no_run
    /// # use basalt::Templates;
    /// let templates = Templates::new("templates").configure(|env| {
    ///     env.add_function("shout", |s: String| s.to_uppercase());
    /// });
    /// ```
    pub fn configure(mut self, f: impl Fn(&mut Environment<'static>) + Send + Sync + 'static) -> Self {
        self.configure = Some(Arc::new(f));
        self
    }

    /// Renders `name` composed with the layout.
    pub fn render<S: Serialize>(&self, name: &str, data: S) -> Result<String, Error> {
        let env = self.lookup(true, name)?;
        let out = env.get_template(LAYOUT_NAME)?.render(data)?;
        Ok(out)
    }

    /// Renders `name` alone, ignoring the layout.
    pub fn render_only<S: Serialize>(&self, name: &str, data: S) -> Result<String, Error> {
        let env = self.lookup(false, name)?;
        let out = env.get_template(CONTENT_NAME)?.render(data)?;
        Ok(out)
    }

    /// Resolves the compiled environment for `name`, from cache unless in
    /// development mode. Under concurrent first access both callers may
    /// compile, but the insert is if-absent: one environment wins the slot
    /// and both callers render successfully.
    fn lookup(&self, with_layout: bool, name: &str) -> Result<Arc<Environment<'static>>, Error> {
        let key = if with_layout {
            format!("{}:{name}", self.layout)
        } else {
            name.to_owned()
        };

        if !self.development {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(env) = cache.get(&key) {
                return Ok(Arc::clone(env));
            }
        }

        let env = Arc::new(self.build(with_layout, name)?);

        if self.development {
            return Ok(env);
        }

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(key).or_insert(env)))
    }

    fn build(&self, with_layout: bool, name: &str) -> Result<Environment<'static>, Error> {
        let mut env = Environment::new();
        if let Some(configure) = &self.configure {
            configure(&mut env);
        }

        let page_path = self.directory.join(format!("{name}{}", self.extension));
        let page_src = fs::read_to_string(&page_path)?;

        if with_layout {
            let layout_path = self.directory.join(format!("{}{}", self.layout, self.extension));
            let layout_src = fs::read_to_string(&layout_path)?;
            env.add_template_owned(LAYOUT_NAME, layout_src)?;
        }
        env.add_template_owned(CONTENT_NAME, page_src)?;

        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    use serde::Serialize;

    #[derive(Serialize)]
    struct Greeting {
        name: &'static str,
    }

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir, "_layout.html", "<html><body>{% include \"content\" %}</body></html>");
        write_file(&dir, "hello.html", "<h1>Hello {{ name }}!</h1>");
        dir
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) {
        let mut f = fs::File::create(dir.path().join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn renders_with_layout() {
        let dir = fixture_dir();
        let t = Templates::new(dir.path());
        let out = t.render("hello", Greeting { name: "World" }).unwrap();
        assert_eq!(out.trim(), "<html><body><h1>Hello World!</h1></body></html>");
    }

    #[test]
    fn renders_without_layout() {
        let dir = fixture_dir();
        let t = Templates::new(dir.path());
        let out = t.render_only("hello", Greeting { name: "World" }).unwrap();
        assert_eq!(out.trim(), "<h1>Hello World!</h1>");
    }

    #[test]
    fn missing_template_is_an_error() {
        let dir = fixture_dir();
        let t = Templates::new(dir.path());
        assert!(t.render("nope", ()).is_err());
    }

    #[test]
    fn cache_serves_stale_source_outside_development() {
        let dir = fixture_dir();
        let t = Templates::new(dir.path());
        let first = t.render_only("hello", Greeting { name: "A" }).unwrap();
        assert_eq!(first.trim(), "<h1>Hello A!</h1>");

        write_file(&dir, "hello.html", "<h2>changed</h2>");
        let second = t.render_only("hello", Greeting { name: "A" }).unwrap();
        assert_eq!(second.trim(), "<h1>Hello A!</h1>");
    }

    #[test]
    fn development_mode_recompiles_every_call() {
        let dir = fixture_dir();
        let t = Templates::new(dir.path()).development(true);
        t.render_only("hello", Greeting { name: "A" }).unwrap();

        write_file(&dir, "hello.html", "<h2>changed</h2>");
        let second = t.render_only("hello", Greeting { name: "A" }).unwrap();
        assert_eq!(second.trim(), "<h2>changed</h2>");
    }

    #[test]
    fn configure_hook_registers_functions() {
        let dir = fixture_dir();
        write_file(&dir, "loud.html", "{{ shout(name) }}");
        let t = Templates::new(dir.path())
            .configure(|env| env.add_function("shout", |s: String| s.to_uppercase()));
        let out = t.render_only("loud", Greeting { name: "quiet" }).unwrap();
        assert_eq!(out.trim(), "QUIET");
    }

    #[test]
    fn concurrent_first_population_is_safe() {
        let dir = fixture_dir();
        let t = Arc::new(Templates::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || t.render("hello", Greeting { name: "World" }).unwrap())
            })
            .collect();

        for h in handles {
            let out = h.join().unwrap();
            assert_eq!(out.trim(), "<html><body><h1>Hello World!</h1></body></html>");
        }
    }
}
