//! Derives `read`/`write` methods for simple `#[repr(uN)]` enums used as
//! object-file fields (section types, symbol bindings, and so on).

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse, Attribute, Data, DataEnum, DeriveInput, Generics, Ident};

#[proc_macro_derive(ReadWrite)]
pub fn derive_read_write(input: TokenStream) -> TokenStream {
    let derive_input: DeriveInput = parse(input).unwrap();

    match derive_input.data {
        Data::Enum(ref enum_data) => derive_enum_read_write_impl(
            &derive_input.ident,
            enum_data,
            &derive_input.generics,
            fetch_repr(&derive_input.attrs),
        ),
        Data::Struct(_) | Data::Union(_) => {
            panic!("`ReadWrite` cannot be derived onto `struct` or `union`")
        }
    }
}

fn derive_enum_read_write_impl(
    enum_name: &Ident,
    data: &DataEnum,
    generics: &Generics,
    repr: Option<Ident>,
) -> TokenStream {
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let repr = repr.expect("A `#[repr(…)]` attribute must be present");
    let repr_name = repr.to_string();
    let (read_combinator, write_combinator) = (
        proc_macro2::Ident::new(
            match repr_name.as_str() {
                "u8" => "read_u8",
                "u16" => "read_u16",
                "u32" => "read_u32",
                _ => panic!("`ReadWrite` does not handle the `{repr_name}` representation yet"),
            },
            proc_macro2::Span::call_site(),
        ),
        proc_macro2::Ident::new(
            match repr_name.as_str() {
                "u8" => "write_u8",
                "u16" => "write_u16",
                "u32" => "write_u32",
                _ => panic!("`ReadWrite` does not handle the `{repr_name}` representation yet"),
            },
            proc_macro2::Span::call_site(),
        ),
    );

    let (read_arms, write_arms, variants): (Vec<_>, Vec<_>, Vec<_>) = data
        .variants
        .iter()
        .map(|variant| {
            let name = &variant.ident;
            let discriminant = match &variant.discriminant {
                Some((_, syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Int(int), .. }))) => int,
                _ => panic!(
                    "All variants must have a discriminant, and it must represent an integer"
                ),
            };

            (
                quote! { #discriminant => Self::#name },
                quote! { Self::#name => #discriminant },
                quote! { #name },
            )
        })
        .unzip3();

    let test_name = proc_macro2::Ident::new(
        &format!("test_{}_read_write", enum_name.to_string().to_lowercase()),
        proc_macro2::Span::call_site(),
    );

    quote! {
        impl #impl_generics #enum_name #ty_generics
        #where_clause
        {
            /// Parse this enum's discriminant out of a binary format.
            pub fn read<'a, N, E>(input: crate::Input<'a>) -> crate::Result<'a, Self, E>
            where
                N: crate::Number,
                E: ::nom::error::ParseError<crate::Input<'a>>,
            {
                let (input, discriminant) = N::#read_combinator::<E>(input)?;

                Ok((
                    input,
                    match discriminant {
                        #( #read_arms, )*
                        _ => return Err(::nom::Err::Error(E::from_error_kind(input, ::nom::error::ErrorKind::Alt))),
                    }
                ))
            }

            /// Write this enum's discriminant into a binary format.
            pub fn write<N, B>(&self, buffer: &mut B) -> ::std::io::Result<()>
            where
                N: crate::Number,
                B: ::std::io::Write,
            {
                let discriminant: #repr = match self {
                    #( #write_arms, )*
                };

                buffer.write_all(&N::#write_combinator(discriminant))
            }
        }

        #[cfg(test)]
        #[test]
        fn #test_name() {
            #(
                {
                    let input: #repr = #enum_name::#variants as _;

                    assert_eq!(
                        #enum_name::read::<crate::LittleEndian, ()>(&input.to_le_bytes()[..]),
                        Ok((&[] as &[u8], #enum_name::#variants))
                    );
                    assert_eq!(
                        #enum_name::read::<crate::BigEndian, ()>(&input.to_be_bytes()[..]),
                        Ok((&[] as &[u8], #enum_name::#variants))
                    );

                    let mut written = Vec::new();
                    #enum_name::#variants.write::<crate::LittleEndian, _>(&mut written).unwrap();
                    assert_eq!(written, input.to_le_bytes());
                }
            )*
        }
    }
    .into()
}

fn fetch_repr(attrs: &[Attribute]) -> Option<Ident> {
    attrs.iter().find_map(|attr| {
        if !attr.path().is_ident("repr") {
            return None;
        }

        attr.parse_args::<Ident>().ok()
    })
}

trait Unzip3<A, B, C> {
    fn unzip3(self) -> (Vec<A>, Vec<B>, Vec<C>);
}

impl<I, A, B, C> Unzip3<A, B, C> for I
where
    I: Iterator<Item = (A, B, C)>,
{
    fn unzip3(self) -> (Vec<A>, Vec<B>, Vec<C>) {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut c = Vec::new();

        for (x, y, z) in self {
            a.push(x);
            b.push(y);
            c.push(z);
        }

        (a, b, c)
    }
}
