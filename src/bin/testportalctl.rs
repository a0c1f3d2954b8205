use diesel::pg::PgConnection;
use diesel::prelude::*;
use dotenv::dotenv;
use exitfailure::ExitFailure;
use failure::ResultExt;
use structopt::StructOpt;
use testportal::models::*;
use testportal::schema::*;
use testportal::{actions, auth};

use std::io::stdin;

#[derive(StructOpt)]
enum Command {
    /// Seed the role table and create the initial administrator account.
    Init {
        #[structopt(long, default_value = "admin@example.com")]
        email: String,
        #[structopt(long, default_value = "admin")]
        name: String,
        #[structopt(long, default_value = "admin")]
        password: String,
    },
    /// List subjects with their themes.
    Subjects,
    /// List a theme's questions with canonical answers.
    Questions { theme_id: i32 },
    /// Add a question to a theme interactively.
    AddQuestion { theme_id: i32 },
    /// Delete a question and everything referencing it.
    DeleteQuestion { id: i32 },
    /// Row counts per table.
    Stats,
}

#[derive(StructOpt)]
struct Args {
    #[structopt(short, long, env = "DATABASE_URL")]
    database_url: String,
    #[structopt(subcommand)]
    command: Command,
}

fn main() -> Result<(), ExitFailure> {
    let _ = dotenv();
    env_logger::init();
    let args = Args::from_args();
    let db = PgConnection::establish(&args.database_url).context("unable to connect database")?;
    match args.command {
        Command::Init {
            email,
            name,
            password,
        } => init(&db, &email, &name, &password)?,
        Command::Subjects => subjects(&db)?,
        Command::Questions { theme_id } => list_questions(&db, theme_id)?,
        Command::AddQuestion { theme_id } => add_question(&db, theme_id)?,
        Command::DeleteQuestion { id } => delete_question(&db, id)?,
        Command::Stats => stats(&db)?,
    }
    Ok(())
}

fn init(db: &PgConnection, email: &str, name: &str, password: &str) -> Result<(), failure::Error> {
    for role in &[actions::ROLE_USER, actions::ROLE_ADMIN] {
        diesel::insert_into(roles::table)
            .values(&NewRole { name: role })
            .on_conflict_do_nothing()
            .execute(db)?;
    }
    let admin_role: i32 = roles::table
        .filter(roles::name.eq(actions::ROLE_ADMIN))
        .select(roles::id)
        .first(db)?;
    let password_hash = auth::hash_password(password);
    let inserted = diesel::insert_into(users::table)
        .values(&NewUser {
            email,
            name,
            password_hash: &password_hash,
            role_id: admin_role,
        })
        .on_conflict_do_nothing()
        .execute(db)?;
    if inserted == 0 {
        println!("administrator account already exists: {}", email);
    } else {
        println!("administrator account created: {}", email);
    }
    Ok(())
}

fn subjects(db: &PgConnection) -> Result<(), failure::Error> {
    let subject_rows = subjects::table
        .order(subjects::id)
        .load::<Subject>(db)
        .context("unable to get subjects")?;
    for subject in subject_rows {
        println!("{} ({})", subject.id, subject.name);
        let theme_rows = themes::table
            .filter(themes::subject_id.eq(subject.id))
            .order(themes::id)
            .load::<Theme>(db)?;
        for theme in theme_rows {
            println!("  {} ({}): {}", theme.id, theme.name, theme.description);
        }
    }
    Ok(())
}

fn list_questions(db: &PgConnection, theme_id: i32) -> Result<(), failure::Error> {
    let question_rows = questions::table
        .filter(questions::theme_id.eq(theme_id))
        .order(questions::id)
        .load::<Question>(db)
        .context("unable to get questions")?;
    for question in question_rows {
        println!(
            "{} (max mark {}): {}",
            question.id, question.max_mark, question.text
        );
        println!("  answer: {}", question.answer);
    }
    Ok(())
}

fn read_line(prompt: &str) -> Result<String, failure::Error> {
    println!("{}", prompt);
    let mut input = String::new();
    stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn add_question(db: &PgConnection, theme_id: i32) -> Result<(), failure::Error> {
    let text = read_line("Question text:")?;
    let answer = read_line("Canonical answer (separate multiple parts with '; '):")?;
    let max_mark: i32 = read_line("Maximum mark:")?.parse()?;
    let question = actions::create_question(
        db,
        theme_id,
        &QuestionData {
            text,
            answer,
            max_mark,
        },
    )?;
    println!("created question {}", question.id);
    Ok(())
}

fn delete_question(db: &PgConnection, id: i32) -> Result<(), failure::Error> {
    actions::delete_question(db, id)?;
    println!("deleted question {}", id);
    Ok(())
}

fn stats(db: &PgConnection) -> Result<(), failure::Error> {
    let users: i64 = users::table.count().get_result(db)?;
    let subjects: i64 = subjects::table.count().get_result(db)?;
    let themes: i64 = themes::table.count().get_result(db)?;
    let teachers: i64 = teachers::table.count().get_result(db)?;
    let questions: i64 = questions::table.count().get_result(db)?;
    let tests: i64 = tests::table.count().get_result(db)?;
    let answers: i64 = answers::table.count().get_result(db)?;
    println!("users: {}", users);
    println!("subjects: {}", subjects);
    println!("themes: {}", themes);
    println!("teachers: {}", teachers);
    println!("questions: {}", questions);
    println!("tests: {}", tests);
    println!("answers: {}", answers);
    Ok(())
}
