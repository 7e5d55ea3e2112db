use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, Ident, ItemFn, Pat, PathArguments,
    Signature, Type,
};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::model::memory::MemoryPlatform`, [`mongodb::Database`] and
/// `crate::model::mongodb::Coll<T>`. The client's rocket is built on the
/// injected platform, with the example config.
///
/// Tests taking a database get a fresh one from `crate::test_database()`,
/// which is dropped however the test terminates. When no database is
/// configured the test is skipped.
#[proc_macro_attribute]
pub fn backend_test(_args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let Injected {
        args: test_args,
        needs_db,
        collection_idents,
        collection_types,
    } = match check_sig(item_fn.sig.clone()) {
        Ok(injected) => injected,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let db_setup = if needs_db {
        quote! {
            let db = match runtime.block_on(crate::test_database()) {
                Some(db) => db,
                None => {
                    eprintln!("skipping {}: no `db_uri` configured", stringify!(#name));
                    return;
                }
            };
        }
    } else {
        TokenStream2::new()
    };
    let db_cleanup = if needs_db {
        quote! {
            runtime.block_on(db.drop(None)).unwrap();
        }
    } else {
        TokenStream2::new()
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::model::memory::MemoryPlatform,
            ) {
                log4rs_test_utils::test_logging::init_logging_once_for(
                    ["club_elections"],
                    None,
                    None,
                );
                let platform = crate::model::memory::MemoryPlatform::new();
                let rocket = crate::rocket_for_platform(
                    platform.platform(),
                    crate::config::Config::example(),
                );
                let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                    .await
                    .unwrap();
                (rocket_client, platform)
            }

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            #db_setup

            // Run the test, catching any panics so the database is always
            // dropped.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                runtime.block_on(async {
                    #[allow(unused_variables)]
                    let (rocket_client, platform) = setup().await;
                    #(
                        let #collection_idents =
                            crate::model::mongodb::Coll::<#collection_types>::from_db(&db);
                    )*
                    #new_name(#(#test_args),*).await;
                });
            }));

            // Run the cleanup.
            #db_cleanup

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::panic_any(cause);
            }
        }
    }
    .into()
}

/// What a test asks to have injected.
struct Injected {
    args: Vec<TokenStream2>,
    needs_db: bool,
    collection_idents: Vec<Ident>,
    collection_types: Vec<Ident>,
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Injected, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_platform = false;
    let mut has_db = false;
    let mut args = vec![];
    let mut collection_idents = vec![];
    let mut collection_types = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(pat_ident) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    // Valid as the last path segment for any type is itself.
                    let segment = type_path.path.segments.last().unwrap();
                    let type_ident = &segment.ident;
                    if type_ident == "Client" {
                        if has_client {
                            return Err(syn::Error::new(input.span(), "Test cannot accept more than one `rocket::local::asynchronous::Client`"));
                        }
                        has_client = true;
                        args.push(quote! { rocket_client });
                        continue;
                    } else if type_ident == "MemoryPlatform" {
                        if has_platform {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `MemoryPlatform`",
                            ));
                        }
                        has_platform = true;
                        args.push(quote! { platform.clone() });
                        continue;
                    } else if type_ident == "Database" {
                        if has_db {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `mongodb::Database`",
                            ));
                        }
                        has_db = true;
                        args.push(quote! { db.clone() });
                        continue;
                    } else if type_ident == "Coll" {
                        if let PathArguments::AngleBracketed(generics) = &segment.arguments {
                            if let Some(GenericArgument::Type(Type::Path(type_path))) =
                                generics.args.first()
                            {
                                if let Some(type_ident) = type_path.path.get_ident() {
                                    let ident = pat_ident.ident.clone();
                                    args.push(quote! { #ident });
                                    collection_idents.push(ident);
                                    collection_types.push(type_ident.clone());
                                    continue;
                                }
                            }
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `platform_ident: MemoryPlatform`, \
             `db_ident: Database` or `collection_ident: Coll<T>`",
        ));
    }

    let needs_db = has_db || !collection_idents.is_empty();
    Ok(Injected {
        args,
        needs_db,
        collection_idents,
        collection_types,
    })
}
