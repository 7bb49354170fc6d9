/// Command line and interactive console for ATR disk images

use atrmanager::filesystem::DirEntry;
use atrmanager::map::draw_sector_map;
use atrmanager::*;
use clap::{arg, crate_version, Arg, ArgAction, ArgMatches, Command};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::fs::File;
use std::io::Write;
use std::process::ExitCode;

const RCH: &str = "unreachable was reached";

/// Commands that work both from the command line and inside the shell
fn disk_commands() -> Vec<Command> {
    vec![
        Command::new("ls")
            .about("directory listing (default when no command is given)")
            .arg(Arg::new("long").short('l').action(ArgAction::SetTrue).help("long listing"))
            .arg(Arg::new("all").short('a').action(ArgAction::SetTrue).help("show system files"))
            .arg(Arg::new("single").short('1').action(ArgAction::SetTrue).help("one name per line")),
        Command::new("cat")
            .about("type file to console")
            .arg(arg!(-e --eol "convert line endings from 0x9b to 0x0a").action(ArgAction::SetTrue))
            .arg(arg!(<NAME> "atari file name")),
        Command::new("get")
            .about("copy file from diskette to the host")
            .arg(arg!(<NAME> "atari file name"))
            .arg(arg!([LOCAL] "local file name, defaults to the atari name")),
        Command::new("put")
            .about("copy file from the host to diskette")
            .arg(arg!(<LOCAL> "local file name"))
            .arg(arg!([NAME] "atari file name, defaults to the local base name")),
        Command::new("rm")
            .about("delete a file")
            .arg(arg!(<NAME> "atari file name")),
        Command::new("free").about("print amount of free space"),
        Command::new("check").about("check filesystem"),
        Command::new("map").about("draw the sector allocation map"),
        Command::new("sector")
            .about("hex dump one sector")
            .arg(arg!(<SECTOR> "sector number").value_parser(clap::value_parser!(u16))),
    ]
}

fn build_cli() -> Command {
    let long_help = "With no command, ls is assumed.
Set RUST_LOG environment variable to control logging level.
  levels: trace,debug,info,warn,error

Examples:
---------
long listing:       `atr game.atr ls -la`
extract a file:     `atr game.atr get autorun.sys`
add a file:         `atr game.atr put ./prog.bas PROG.BAS`
new enhanced disk:  `atr blank.atr new --enhanced`";

    Command::new("atr")
        .about("Atari DOS 2.0S / 2.5 diskette access")
        .after_long_help(long_help)
        .version(crate_version!())
        .arg(arg!(<IMAGE> "path to the ATR disk image"))
        .subcommands(disk_commands())
        .subcommand(
            Command::new("new")
                .about("create a blank formatted disk image")
                .arg(arg!(--enhanced "DOS 2.5 enhanced density (1040 sectors)").action(ArgAction::SetTrue)),
        )
        .subcommand(Command::new("shell").about("interactive console on the disk image"))
}

/// Command set parsed from each shell line
fn shell_cli() -> Command {
    Command::new("atr")
        .no_binary_name(true)
        .disable_version_flag(true)
        .subcommand_required(true)
        .subcommands(disk_commands())
}

/// Command completer for the REPL
struct CommandCompleter {
    commands: Vec<String>,
}

impl CommandCompleter {
    fn new() -> Self {
        let mut commands: Vec<String> = disk_commands()
            .iter()
            .map(|c| c.get_name().to_string())
            .collect();
        commands.extend(["help", "quit", "exit"].map(String::from));
        commands.sort();
        Self { commands }
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Only complete the first word (command name)
        let line_to_cursor = &line[..pos];
        if line_to_cursor.contains(' ') {
            return Ok((pos, vec![]));
        }

        let prefix = line_to_cursor.to_lowercase();
        let matches: Vec<Pair> = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(&prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// Get the path to the history file
fn history_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|mut p| {
        p.push(".atrmanager_history");
        p
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let matches = build_cli().get_matches();
    let path = matches.get_one::<String>("IMAGE").expect(RCH);

    match run(path, matches.subcommand()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("atr: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(path: &str, command: Option<(&str, &ArgMatches)>) -> Result<()> {
    if let Some(("new", cmd)) = command {
        let density = if cmd.get_flag("enhanced") {
            Density::Enhanced
        } else {
            Density::Single
        };
        AtrImage::create_file(path, density)?;
        println!("Created blank {} disk '{}'", density, path);
        return Ok(());
    }

    let mut image = AtrImage::open(path)?;
    match command {
        Some(("shell", _)) => {
            shell(&mut image, path);
            Ok(())
        }
        _ => dispatch(&mut image, command),
    }
}

/// Run one disk command against an open image
fn dispatch(image: &mut AtrImage<File>, command: Option<(&str, &ArgMatches)>) -> Result<()> {
    let mut fs = Dos2FileSystem::new(image);

    match command {
        None => list(&mut fs, false, false, false),
        Some(("ls", cmd)) => list(
            &mut fs,
            cmd.get_flag("all"),
            cmd.get_flag("long"),
            cmd.get_flag("single"),
        ),
        Some(("cat", cmd)) => {
            let name = cmd.get_one::<String>("NAME").expect(RCH);
            let mut out = std::io::stdout().lock();
            fs.read_file_to(name, cmd.get_flag("eol"), &mut out)?;
            out.flush()?;
            Ok(())
        }
        Some(("get", cmd)) => {
            let name = cmd.get_one::<String>("NAME").expect(RCH);
            let local = cmd.get_one::<String>("LOCAL").unwrap_or(name);
            fs.get_file(name, local)?;
            Ok(())
        }
        Some(("put", cmd)) => {
            let local = cmd.get_one::<String>("LOCAL").expect(RCH);
            let name = cmd.get_one::<String>("NAME").map(String::as_str);
            fs.put_file(local, name)?;
            Ok(())
        }
        Some(("rm", cmd)) => fs.delete_file(cmd.get_one::<String>("NAME").expect(RCH)),
        Some(("free", _)) => {
            print_free(&fs.info()?);
            Ok(())
        }
        Some(("check", _)) => {
            println!("{}", fs.check()?);
            Ok(())
        }
        Some(("map", _)) => draw_sector_map(fs.image()),
        Some(("sector", cmd)) => {
            let sector = *cmd.get_one::<u16>("SECTOR").expect(RCH);
            let data = fs.image().read_sector(sector)?;
            println!("Sector {}:", sector);
            print_hex_dump(&data);
            Ok(())
        }
        Some((other, _)) => Err(AtrError::invalid_format(format!("unknown command '{}'", other))),
    }
}

fn shell(image: &mut AtrImage<File>, path: &str) {
    println!("=== ATRManager ===");
    println!("Interactive console for '{}' ({})", path, image.density());
    println!("Type 'help' for available commands\n");

    let mut rl = match Editor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("atr: {}", e);
            return;
        }
    };
    rl.set_helper(Some(CommandCompleter::new()));

    // Load history if available
    if let Some(history_path) = history_path() {
        let _ = rl.load_history(&history_path);
    }

    loop {
        let input = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        let parts = parse_command_line(input);
        if parts.is_empty() {
            continue;
        }

        match parts[0].to_lowercase().as_str() {
            "help" => print_help(),
            "quit" | "exit" => break,
            _ => match shell_cli().try_get_matches_from(&parts) {
                Ok(matches) => {
                    if let Err(e) = dispatch(image, matches.subcommand()) {
                        println!("Error: {}", e);
                    }
                }
                Err(e) => {
                    let _ = e.print();
                }
            },
        }
    }

    // Save history before exiting
    if let Some(history_path) = history_path() {
        let _ = rl.save_history(&history_path);
    }
    println!("Goodbye!");
}

fn parse_command_line(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(current.clone());
                    current.clear();
                }
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn print_help() {
    println!("Available commands:");
    println!("  ls [-la1]                  - Directory listing");
    println!("                                 -l for long, -a to show system files,");
    println!("                                 -1 for a single name per line");
    println!("  cat [-e] <name>            - Type file to console (-e converts 0x9b to 0x0a)");
    println!("  get <name> [local]         - Copy file from diskette to local file");
    println!("  put <local> [name]         - Copy local file to diskette");
    println!("  rm <name>                  - Delete a file");
    println!("  free                       - Print amount of free space");
    println!("  check                      - Check filesystem");
    println!("  map                        - Visual sector map (white=in use, yellow=reserved)");
    println!("  sector <n>                 - Hex dump a sector");
    println!("  help                       - Show this help");
    println!("  quit, exit                 - Exit");
}

fn print_free(info: &FileSystemInfo) {
    println!("{} free sectors, {} free bytes", info.free_sectors, info.free_bytes());
}

fn rights(entry: &DirEntry) -> String {
    format!(
        "-r{}{}{}",
        if entry.attributes.locked { '-' } else { 'w' },
        if entry.attributes.executable { 'x' } else { '-' },
        if entry.attributes.system { 's' } else { '-' }
    )
}

fn list<S>(fs: &mut Dos2FileSystem<'_, S>, all: bool, long: bool, single: bool) -> Result<()>
where
    S: std::io::Read + std::io::Write + std::io::Seek,
{
    let entries: Vec<DirEntry> = fs
        .read_dir()?
        .into_iter()
        .filter(|e| all || !e.attributes.system)
        .collect();

    if long {
        println!();
        for entry in &entries {
            let line = format!(
                "{} {:6} ({:3}) {:<13}",
                rights(entry),
                entry.size,
                entry.sectors,
                entry.name
            );
            match &entry.binary {
                Some(binary) => println!("{} ({})", line, binary),
                None => println!("{}", line),
            }
        }
        let sectors: usize = entries.iter().map(|e| e.sectors as usize).sum();
        let bytes: usize = entries.iter().map(|e| e.size).sum();
        println!("\n{} entries", entries.len());
        println!("\n{} sectors, {} bytes", sectors, bytes);
        println!();
        print_free(&fs.info()?);
        println!();
    } else if single {
        for entry in &entries {
            println!("{}", entry.name);
        }
    } else {
        // Columns ordered like ls
        let cols = 80 / 13;
        let rows = entries.len().div_ceil(cols);
        for y in 0..rows {
            let mut line = String::new();
            for x in 0..cols {
                if let Some(entry) = entries.get(y + x * rows) {
                    line.push_str(&format!("{:<12}  ", entry.name));
                }
            }
            println!("{}", line.trim_end());
        }
    }

    Ok(())
}

fn print_hex_dump(data: &[u8]) {
    for (i, chunk) in data.chunks(16).enumerate() {
        print!("{:04X}: ", i * 16);

        for (j, byte) in chunk.iter().enumerate() {
            print!("{:02X} ", byte);
            if j == 7 {
                print!(" ");
            }
        }

        print!(" |");

        // ATASCII shares printable ASCII
        for byte in chunk {
            let c = if *byte >= 32 && *byte < 127 {
                *byte as char
            } else {
                '.'
            };
            print!("{}", c);
        }

        println!("|");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_line() {
        assert_eq!(parse_command_line("get  dos.sys"), vec!["get", "dos.sys"]);
        assert_eq!(
            parse_command_line("put \"my file.txt\" FILE.TXT"),
            vec!["put", "my file.txt", "FILE.TXT"]
        );
        assert!(parse_command_line("   ").is_empty());
    }

    #[test]
    fn test_cli_definitions() {
        build_cli().debug_assert();
        shell_cli().debug_assert();
    }

    #[test]
    fn test_shell_parses_combined_flags() {
        let matches = shell_cli().try_get_matches_from(["ls", "-la1"]).unwrap();
        let (name, ls) = matches.subcommand().unwrap();
        assert_eq!(name, "ls");
        assert!(ls.get_flag("long"));
        assert!(ls.get_flag("all"));
        assert!(ls.get_flag("single"));
    }
}
