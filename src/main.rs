use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use tmbridge::cli::{CliArgs, Command};
use tmbridge::config::BridgeConfig;
use tmbridge::document::Document;
use tmbridge::formatter::{check_convergence, Formatter, WhitespaceFormatter};
use tmbridge::grammar::{parse_raw_grammar, GrammarLocation};
use tmbridge::host::{HeadlessHost, PlainTextProvider, StyledToken, TokensProvider};
use tmbridge::language::{detect_language, LanguageConfiguration, LanguageSpec};
use tmbridge::setup::Bridge;
use tmbridge::theme::{list_available_themes, FontStyle, ResolvedStyle, ThemeSource};

fn main() -> Result<()> {
    let args = CliArgs::parse();
    tmbridge::tracing::init();

    let config = match &args.config {
        Some(path) => BridgeConfig::load_from(path),
        None => BridgeConfig::load(),
    };

    match &args.command {
        Command::Themes => list_themes(),
        Command::Format { file, check, .. } => {
            let format_config = args.command.format_config(config.format);
            let source = read_source(file)?;
            let formatter = WhitespaceFormatter::new();
            if *check {
                check_convergence(&formatter, &source, &format_config)
                    .with_context(|| format!("{} does not format stably", file.display()))?;
                println!("{}: ok", file.display());
            } else {
                let formatted = formatter
                    .format(&source, &format_config)
                    .with_context(|| format!("Failed to format {}", file.display()))?;
                print!("{}", formatted);
            }
            Ok(())
        }
        Command::Tokens { file } => {
            let document = tokenize_file(&args, &config, file)?;
            print_tokens(&document)
        }
        Command::Highlight { file } => {
            let document = tokenize_file(&args, &config, file)?;
            print_highlighted(&document)
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn list_themes() -> Result<()> {
    for info in list_available_themes() {
        let source = match info.source {
            ThemeSource::User => "user",
            ThemeSource::Builtin => "builtin",
        };
        println!("{:<20} {:<24} {}", info.id, info.name, source);
    }
    Ok(())
}

/// Language for `file`: `--language`, then extension, then a bare `--grammar`
fn resolve_language(args: &CliArgs, config: &BridgeConfig, file: &Path) -> Result<Option<LanguageSpec>> {
    let config_dir = tmbridge::config_paths::config_dir();
    let specs = config.language_specs(config_dir.as_deref());

    let mut spec = match &args.language {
        Some(id) => match specs.iter().find(|s| &s.id == id) {
            Some(spec) => Some(spec.clone()),
            None if args.grammar.is_none() => bail!("Unknown language: {}", id),
            None => None,
        },
        None => detect_language(file, &specs).cloned(),
    };

    if let Some(grammar) = &args.grammar {
        spec = Some(match spec {
            Some(mut spec) => {
                spec.grammar = GrammarLocation::path(grammar);
                spec
            }
            None => spec_from_grammar(args.language.as_deref(), grammar)?,
        });
    }
    Ok(spec)
}

/// Ad-hoc language around a grammar file, named after its scope
fn spec_from_grammar(language_id: Option<&str>, grammar: &Path) -> Result<LanguageSpec> {
    let text = read_source(grammar)?;
    let raw = parse_raw_grammar(&text, &grammar.display().to_string())
        .with_context(|| format!("Invalid grammar {}", grammar.display()))?;
    let id = language_id
        .map(str::to_string)
        .unwrap_or_else(|| raw.scope_name.rsplit('.').next().unwrap_or("custom").to_string());
    Ok(LanguageSpec {
        id,
        scope_name: raw.scope_name,
        extensions: Vec::new(),
        grammar: GrammarLocation::path(grammar),
        configuration: LanguageConfiguration::default(),
    })
}

fn tokenize_file(
    args: &CliArgs,
    config: &BridgeConfig,
    file: &Path,
) -> Result<Document> {
    let source = read_source(file)?;
    let bridge = Bridge::from_config(config);
    let host = HeadlessHost::new();

    bridge.register_themes(&host, &config.theme_entries());
    let theme = args.theme.as_deref().unwrap_or(&config.theme);
    if let Err(e) = bridge.activate_theme(&host, theme) {
        eprintln!("Warning: {}", e);
    }

    let provider: Arc<dyn TokensProvider> = match resolve_language(args, config, file)? {
        Some(spec) => {
            if let Err(e) = bridge.setup_language_spec(&host, &spec) {
                eprintln!("Warning: {}; showing plain text", e);
            }
            host.tokens_provider(&spec.id)
                .unwrap_or_else(|| Arc::new(PlainTextProvider))
        }
        None => {
            tracing::info!("No language for {}, showing plain text", file.display());
            Arc::new(PlainTextProvider)
        }
    };

    let mut document = Document::with_text(&source);
    document.ensure_tokenized(provider.as_ref(), usize::MAX);
    Ok(document)
}

fn print_tokens(document: &Document) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    for line_idx in 0..document.line_count() {
        for token in document.tokens(line_idx).unwrap_or_default() {
            let scope = if token.scope.is_empty() { "-" } else { &token.scope };
            writeln!(
                out,
                "{}:{}\t{}\t{}",
                line_idx + 1,
                token.start_column,
                scope,
                token.scopes.join(" ")
            )?;
        }
    }
    out.flush()?;
    Ok(())
}

fn print_highlighted(document: &Document) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    for line_idx in 0..document.line_count() {
        let line = document.line(line_idx).unwrap_or_default();
        let tokens = document.tokens(line_idx).unwrap_or_default();
        write_highlighted_line(&mut out, &line, tokens)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn write_highlighted_line(out: &mut impl Write, line: &str, tokens: &[StyledToken]) -> io::Result<()> {
    let chars: Vec<char> = line.chars().collect();
    for (i, token) in tokens.iter().enumerate() {
        let start = token.start_column.min(chars.len());
        let end = tokens
            .get(i + 1)
            .map_or(chars.len(), |next| next.start_column.min(chars.len()));
        let text: String = chars[start..end.max(start)].iter().collect();
        match &token.style {
            Some(style) => write!(out, "{}{}\x1b[0m", ansi_style(style), text)?,
            None => write!(out, "{}", text)?,
        }
    }
    Ok(())
}

fn ansi_style(style: &ResolvedStyle) -> String {
    let fg = style.foreground;
    let mut codes = format!("\x1b[38;2;{};{};{}", fg.r, fg.g, fg.b);
    for (flag, code) in [
        (FontStyle::BOLD, ";1"),
        (FontStyle::ITALIC, ";3"),
        (FontStyle::UNDERLINE, ";4"),
        (FontStyle::STRIKETHROUGH, ";9"),
    ] {
        if style.font_style.contains(flag) {
            codes.push_str(code);
        }
    }
    codes.push('m');
    codes
}
