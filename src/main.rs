use clap::Parser;
use gazette::cli::{
    handle_add, handle_comment, handle_import, handle_init, handle_like, handle_list,
    handle_moderate_delete, handle_moderate_list, handle_moderate_set, handle_read, handle_serve,
    Cli, Commands, ModerateAction,
};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => handle_init(),
        Commands::Add {
            title,
            author,
            category,
            image,
            stdin,
            json,
        } => handle_add(title, author, category, image, stdin, json),
        Commands::Import { file, json } => handle_import(file, json),
        Commands::List { json } => handle_list(json),
        Commands::Read { slug, json } => handle_read(slug, json),
        Commands::Comment { slug, text, author } => handle_comment(slug, text, author),
        Commands::Like { slug } => handle_like(slug),
        Commands::Moderate(moderate) => match moderate.action {
            ModerateAction::List { json } => handle_moderate_list(json),
            ModerateAction::Approve { id } => handle_moderate_set(id, true),
            ModerateAction::Unapprove { id } => handle_moderate_set(id, false),
            ModerateAction::Delete { id, force } => handle_moderate_delete(id, force),
        },
        Commands::Serve { addr } => handle_serve(addr),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
